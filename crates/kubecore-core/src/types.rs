use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Composite resource kinds that make up the KubeCore platform graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    XGitHubProvider,
    XGitHubProject,
    XGitHubApp,
    XKubeNet,
    XKubeCluster,
    XKubeSystem,
    XKubEnv,
    XQualityGate,
    XApp,
    Other(String),
}

impl ResourceKind {
    /// All kinds the platform model has tables for.
    pub const PLATFORM_KINDS: [ResourceKind; 9] = [
        ResourceKind::XGitHubProvider,
        ResourceKind::XGitHubProject,
        ResourceKind::XGitHubApp,
        ResourceKind::XKubeNet,
        ResourceKind::XKubeCluster,
        ResourceKind::XKubeSystem,
        ResourceKind::XKubEnv,
        ResourceKind::XQualityGate,
        ResourceKind::XApp,
    ];

    pub fn is_platform_kind(&self) -> bool {
        !matches!(self, ResourceKind::Other(_))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::XGitHubProvider => "XGitHubProvider",
            ResourceKind::XGitHubProject => "XGitHubProject",
            ResourceKind::XGitHubApp => "XGitHubApp",
            ResourceKind::XKubeNet => "XKubeNet",
            ResourceKind::XKubeCluster => "XKubeCluster",
            ResourceKind::XKubeSystem => "XKubeSystem",
            ResourceKind::XKubEnv => "XKubEnv",
            ResourceKind::XQualityGate => "XQualityGate",
            ResourceKind::XApp => "XApp",
            ResourceKind::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ResourceKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "XGitHubProvider" => ResourceKind::XGitHubProvider,
            "XGitHubProject" => ResourceKind::XGitHubProject,
            "XGitHubApp" => ResourceKind::XGitHubApp,
            "XKubeNet" => ResourceKind::XKubeNet,
            "XKubeCluster" => ResourceKind::XKubeCluster,
            "XKubeSystem" => ResourceKind::XKubeSystem,
            "XKubEnv" => ResourceKind::XKubEnv,
            "XQualityGate" => ResourceKind::XQualityGate,
            "XApp" => ResourceKind::XApp,
            other => ResourceKind::Other(other.to_string()),
        })
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(ResourceKind::Other(s)))
    }
}

/// Relationship kinds between two platform resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    Owns,
    BelongsTo,
    Uses,
    Supports,
    RunsOn,
    Hosts,
    AppliesTo,
    Sources,
    SourcedBy,
    DeploysTo,
}

impl RelationType {
    pub const ALL: [RelationType; 10] = [
        RelationType::Owns,
        RelationType::BelongsTo,
        RelationType::Uses,
        RelationType::Supports,
        RelationType::RunsOn,
        RelationType::Hosts,
        RelationType::AppliesTo,
        RelationType::Sources,
        RelationType::SourcedBy,
        RelationType::DeploysTo,
    ];
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationType::Owns => "owns",
            RelationType::BelongsTo => "belongsTo",
            RelationType::Uses => "uses",
            RelationType::Supports => "supports",
            RelationType::RunsOn => "runsOn",
            RelationType::Hosts => "hosts",
            RelationType::AppliesTo => "appliesTo",
            RelationType::Sources => "sources",
            RelationType::SourcedBy => "sourcedBy",
            RelationType::DeploysTo => "deploysTo",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "owns" => Ok(RelationType::Owns),
            "belongsTo" => Ok(RelationType::BelongsTo),
            "uses" => Ok(RelationType::Uses),
            "supports" => Ok(RelationType::Supports),
            "runsOn" => Ok(RelationType::RunsOn),
            "hosts" => Ok(RelationType::Hosts),
            "appliesTo" => Ok(RelationType::AppliesTo),
            "sources" => Ok(RelationType::Sources),
            "sourcedBy" => Ok(RelationType::SourcedBy),
            "deploysTo" => Ok(RelationType::DeploysTo),
            other => Err(format!("unknown relation type: {}", other)),
        }
    }
}

/// Declared cardinality between two related kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cardinality::OneToOne => "1:1",
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToMany => "N:N",
        };
        write!(f, "{}", s)
    }
}

impl Serialize for Cardinality {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// How instances of a schema block were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    Direct,
    Reverse,
    Transitive,
    Hybrid,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryMethod::Direct => "direct",
            DiscoveryMethod::Reverse => "reverse",
            DiscoveryMethod::Transitive => "transitive",
            DiscoveryMethod::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

/// A reference to a cluster resource. Namespace is absent for
/// cluster-scoped resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: ResourceKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn new(
        api_version: impl Into<String>,
        kind: ResourceKind,
        name: impl Into<String>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind,
            name: name.into(),
            namespace,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A fetched resource together with its extracted outbound edges.
/// Created by the forward resolver and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub reference: ResourceRef,
    pub data: serde_json::Value,
    pub edges: Vec<ResourceRef>,
    pub resolved_at: Instant,
    pub cached: bool,
}

impl ResolvedResource {
    pub fn new(reference: ResourceRef, data: serde_json::Value) -> Self {
        Self {
            reference,
            data,
            edges: Vec::new(),
            resolved_at: Instant::now(),
            cached: false,
        }
    }

    /// Age of the resolution in seconds.
    pub fn age_secs(&self) -> f64 {
        self.resolved_at.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_display() {
        for kind in ResourceKind::PLATFORM_KINDS {
            let parsed: ResourceKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        let custom: ResourceKind = "ConfigMap".parse().unwrap();
        assert_eq!(custom, ResourceKind::Other("ConfigMap".to_string()));
    }

    #[test]
    fn kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&ResourceKind::XKubEnv).unwrap();
        assert_eq!(json, "\"XKubEnv\"");
        let back: ResourceKind = serde_json::from_str("\"XApp\"").unwrap();
        assert_eq!(back, ResourceKind::XApp);
    }

    #[test]
    fn ref_display_includes_namespace_when_present() {
        let namespaced = ResourceRef::new(
            "platform.kubecore.io/v1alpha1",
            ResourceKind::XKubEnv,
            "demo-dev",
            Some("test".to_string()),
        );
        assert_eq!(namespaced.to_string(), "XKubEnv/test/demo-dev");

        let cluster_scoped = ResourceRef::new(
            "platform.kubecore.io/v1alpha1",
            ResourceKind::XKubeCluster,
            "demo-cluster",
            None,
        );
        assert_eq!(cluster_scoped.to_string(), "XKubeCluster/demo-cluster");
    }

    #[test]
    fn refs_hash_over_all_fields() {
        use std::collections::HashSet;
        let a = ResourceRef::new("v1", ResourceKind::XApp, "a", Some("ns".into()));
        let b = ResourceRef::new("v1", ResourceKind::XApp, "a", None);
        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(!set.contains(&b));
        assert!(set.contains(&a));
    }

    #[test]
    fn relation_type_round_trips() {
        for rel in RelationType::ALL {
            let parsed: RelationType = rel.to_string().parse().unwrap();
            assert_eq!(parsed, rel);
        }
    }
}
