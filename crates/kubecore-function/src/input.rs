//! Input-document parsing: the query, the request context, and the
//! references harvested from the observed composite.

use std::collections::BTreeMap;

use kubecore_core::{KubeCoreError, Result};
use serde_json::Value;
use tracing::{debug, warn};

/// Parsed `spec.query` of the input document.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub resource_type: String,
    pub requested_schemas: Vec<String>,
    pub include_full_schemas: bool,
}

/// Request context assembled from the input document and the observed
/// composite.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub requestor_name: String,
    pub requestor_namespace: String,
    /// Reference lists keyed by `<shortName>Refs`.
    pub references: BTreeMap<String, Vec<Value>>,
    pub enable_transitive: bool,
    pub transitive_max_depth: usize,
}

/// Parse the query block. `resourceType` is the only mandatory field in
/// the whole input document.
pub fn parse_query(input: &Value) -> Result<Query> {
    let query = input
        .pointer("/spec/query")
        .or_else(|| input.get("query"))
        .ok_or_else(|| KubeCoreError::Validation("input has no query".to_string()))?;

    let resource_type = query
        .get("resourceType")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| KubeCoreError::Validation("resourceType is required in query".to_string()))?
        .to_string();

    let requested_schemas = query
        .get("requestedSchemas")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let include_full_schemas = query
        .get("includeFullSchemas")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(Query {
        resource_type,
        requested_schemas,
        include_full_schemas,
    })
}

/// The transitive toggle is accepted in four locations; first hit wins.
/// Absence means enabled.
pub fn transitive_enabled(input: &Value) -> bool {
    lookup_context_value(input, "enableTransitiveDiscovery")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| {
            debug!("enableTransitiveDiscovery not found in any location, defaulting to enabled");
            true
        })
}

fn lookup_context_value<'a>(input: &'a Value, key: &str) -> Option<&'a Value> {
    for base in ["/spec/context", "/spec", "/context", ""] {
        if let Some(value) = input.pointer(&format!("{}/{}", base, key)) {
            debug!(location = base, key, "found context value");
            return Some(value);
        }
    }
    None
}

/// Build the request context from the input document plus the observed
/// composite, whose `spec.*Ref(s)` fields are harvested as references.
pub fn extract_context(input: &Value, observed: &Value, default_max_depth: usize) -> RequestContext {
    let requestor_name = observed
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let requestor_namespace = observed
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or("default")
        .to_string();

    let mut references: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    // Explicit references from the input document.
    if let Some(declared) = input
        .pointer("/spec/context/references")
        .and_then(Value::as_object)
    {
        for (key, value) in declared {
            if let Some(items) = value.as_array() {
                references
                    .entry(key.clone())
                    .or_default()
                    .extend(items.iter().cloned());
            }
        }
    }

    // References harvested from the observed composite spec.
    if let Some(spec) = observed.get("spec").and_then(Value::as_object) {
        for (field, value) in spec {
            if field.ends_with("Refs") {
                if let Some(items) = value.as_array() {
                    let objects: Vec<Value> =
                        items.iter().filter(|item| item.is_object()).cloned().collect();
                    if !objects.is_empty() {
                        references.entry(field.clone()).or_default().extend(objects);
                    }
                }
            } else if field.ends_with("Ref") && value.is_object() {
                references
                    .entry(format!("{}s", field))
                    .or_default()
                    .push(value.clone());
            }
        }
    }

    // Drop duplicate reference entries per key.
    for items in references.values_mut() {
        let mut seen = Vec::new();
        items.retain(|item| {
            if seen.contains(item) {
                false
            } else {
                seen.push(item.clone());
                true
            }
        });
    }

    let transitive_max_depth = lookup_context_value(input, "transitiveMaxDepth")
        .and_then(Value::as_u64)
        .map(|depth| depth as usize)
        .unwrap_or(default_max_depth);

    let context = RequestContext {
        requestor_name,
        requestor_namespace,
        references,
        enable_transitive: transitive_enabled(input),
        transitive_max_depth,
    };

    if context.references.is_empty() {
        warn!("no references found in input or observed composite");
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_requires_resource_type() {
        let valid = json!({"spec": {"query": {"resourceType": "XApp", "requestedSchemas": ["kubEnv"]}}});
        let query = parse_query(&valid).unwrap();
        assert_eq!(query.resource_type, "XApp");
        assert_eq!(query.requested_schemas, vec!["kubEnv"]);
        assert!(!query.include_full_schemas);

        let missing = json!({"spec": {"query": {"requestedSchemas": []}}});
        assert!(matches!(
            parse_query(&missing),
            Err(KubeCoreError::Validation(_))
        ));

        let empty = json!({});
        assert!(parse_query(&empty).is_err());
    }

    #[test]
    fn transitive_flag_defaults_to_enabled() {
        assert!(transitive_enabled(&json!({})));
        assert!(transitive_enabled(&json!({"spec": {"query": {}}})));
    }

    #[test]
    fn transitive_flag_found_in_all_four_locations() {
        let locations = [
            json!({"spec": {"context": {"enableTransitiveDiscovery": false}}}),
            json!({"spec": {"enableTransitiveDiscovery": false}}),
            json!({"context": {"enableTransitiveDiscovery": false}}),
            json!({"enableTransitiveDiscovery": false}),
        ];
        for input in &locations {
            assert!(!transitive_enabled(input), "input: {}", input);
        }
    }

    #[test]
    fn transitive_flag_precedence_is_most_specific_first() {
        let input = json!({
            "enableTransitiveDiscovery": false,
            "context": {"enableTransitiveDiscovery": false},
            "spec": {
                "enableTransitiveDiscovery": false,
                "context": {"enableTransitiveDiscovery": true}
            }
        });
        assert!(transitive_enabled(&input));
    }

    #[test]
    fn context_merges_declared_and_harvested_references() {
        let input = json!({
            "spec": {
                "context": {
                    "references": {
                        "kubEnvRefs": [{"name": "demo-dev", "namespace": "test"}]
                    }
                }
            }
        });
        let observed = json!({
            "kind": "XApp",
            "metadata": {"name": "art-api", "namespace": "default"},
            "spec": {
                "githubProjectRef": {"name": "demo-project"},
                "qualityGateRefs": [{"name": "gate-1"}],
                "image": "registry/app:1.0"
            }
        });

        let context = extract_context(&input, &observed, 3);
        assert_eq!(context.requestor_name, "art-api");
        assert_eq!(context.requestor_namespace, "default");
        assert_eq!(context.references["kubEnvRefs"].len(), 1);
        assert_eq!(
            context.references["githubProjectRefs"],
            vec![json!({"name": "demo-project"})]
        );
        assert_eq!(context.references["qualityGateRefs"].len(), 1);
        assert_eq!(context.transitive_max_depth, 3);
        assert!(context.enable_transitive);
    }

    #[test]
    fn duplicate_references_are_dropped() {
        let input = json!({
            "spec": {
                "context": {
                    "references": {
                        "kubEnvRefs": [
                            {"name": "demo-dev"},
                            {"name": "demo-dev"}
                        ]
                    }
                }
            }
        });
        let observed = json!({"metadata": {"name": "x"}});
        let context = extract_context(&input, &observed, 3);
        assert_eq!(context.references["kubEnvRefs"].len(), 1);
    }

    #[test]
    fn max_depth_override_is_read_from_context() {
        let input = json!({"spec": {"context": {"transitiveMaxDepth": 2}}});
        let observed = json!({"metadata": {"name": "x"}});
        let context = extract_context(&input, &observed, 3);
        assert_eq!(context.transitive_max_depth, 2);
    }
}
