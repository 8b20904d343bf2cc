//! Deterministic fingerprinting of query inputs for the response cache.

use std::collections::BTreeMap;
use std::fmt;

use kubecore_core::ResourceKind;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Whether a query asked for forward-only or bidirectional discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    Forward,
    Bidirectional,
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryMode::Forward => "forward",
            DiscoveryMode::Bidirectional => "bidirectional",
        };
        write!(f, "{}", s)
    }
}

/// The fingerprintable inputs of one query. Building the digest is
/// byte-deterministic: components are canonically ordered and reference
/// values serialize with sorted object keys.
#[derive(Debug, Clone)]
pub struct QueryFingerprint {
    pub resource_type: ResourceKind,
    pub mode: DiscoveryMode,
    pub transitive_enabled: bool,
    pub transitive_max_depth: usize,
    pub target_ref: Option<TargetRef>,
    pub requested_schemas: Vec<String>,
    pub references: BTreeMap<String, Value>,
}

/// Target triple included when reverse discovery is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
}

impl QueryFingerprint {
    pub fn digest(&self) -> String {
        let mut components = vec![
            format!("type:{}", self.resource_type),
            format!("mode:{}", self.mode),
        ];

        if !self.references.is_empty() {
            // BTreeMap iteration plus serde_json's sorted object keys
            // make this stable across runs.
            let refs: Vec<String> = self
                .references
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            components.push(format!("refs:{}", refs.join(",")));
        }

        if let Some(target) = &self.target_ref {
            components.push(format!(
                "target:{}:{}:{}",
                target.kind,
                target.name,
                target.namespace.as_deref().unwrap_or("")
            ));
        }

        if self.transitive_enabled {
            components.push("transitive:enabled".to_string());
            components.push(format!("depth:{}", self.transitive_max_depth));
        }

        if !self.requested_schemas.is_empty() {
            let mut schemas = self.requested_schemas.clone();
            schemas.sort();
            components.push(format!("schemas:{}", schemas.join(":")));
        }

        let mut hasher = Sha256::new();
        hasher.update(components.join("|").as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fingerprint() -> QueryFingerprint {
        QueryFingerprint {
            resource_type: ResourceKind::XApp,
            mode: DiscoveryMode::Forward,
            transitive_enabled: true,
            transitive_max_depth: 3,
            target_ref: None,
            requested_schemas: vec!["kubEnv".to_string(), "githubProject".to_string()],
            references: BTreeMap::from([(
                "kubEnvRefs".to_string(),
                json!([{"name": "demo-dev", "namespace": "test"}]),
            )]),
        }
    }

    #[test]
    fn digest_is_stable_across_runs() {
        let a = fingerprint().digest();
        let b = fingerprint().digest();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn schema_order_does_not_matter() {
        let mut reordered = fingerprint();
        reordered.requested_schemas.reverse();
        assert_eq!(fingerprint().digest(), reordered.digest());
    }

    #[test]
    fn inputs_change_the_digest() {
        let base = fingerprint().digest();

        let mut depth = fingerprint();
        depth.transitive_max_depth = 2;
        assert_ne!(base, depth.digest());

        let mut disabled = fingerprint();
        disabled.transitive_enabled = false;
        assert_ne!(base, disabled.digest());

        let mut target = fingerprint();
        target.mode = DiscoveryMode::Bidirectional;
        target.target_ref = Some(TargetRef {
            kind: ResourceKind::XGitHubProject,
            name: "demo-project".to_string(),
            namespace: Some("test".to_string()),
        });
        assert_ne!(base, target.digest());
    }
}
