//! In-memory schema registry, populated once at startup and immutable
//! thereafter. Each platform kind gets a projection skeleton: an
//! allow-list of `.spec` property paths the summarizer may follow.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::model;
use crate::types::ResourceKind;

/// A registered resource schema with its projection skeleton.
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub api_version: &'static str,
    pub kind: ResourceKind,
    pub projection: Value,
    pub related: Vec<ResourceKind>,
}

static SCHEMAS: Lazy<HashMap<ResourceKind, ResourceSchema>> = Lazy::new(build_schemas);

fn schema_entry(kind: ResourceKind, spec_properties: Value) -> (ResourceKind, ResourceSchema) {
    let related = model::outbound_edges(&kind)
        .iter()
        .flat_map(|(_, targets)| targets.iter().cloned())
        .collect();
    let schema = ResourceSchema {
        api_version: model::api_version(&kind),
        kind: kind.clone(),
        projection: json!({
            "type": "object",
            "properties": {
                "spec": {
                    "type": "object",
                    "properties": spec_properties,
                }
            }
        }),
        related,
    };
    (kind, schema)
}

fn ref_property() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "namespace": {"type": "string"},
        }
    })
}

fn build_schemas() -> HashMap<ResourceKind, ResourceSchema> {
    use ResourceKind::*;
    HashMap::from([
        schema_entry(
            XGitHubProvider,
            json!({
                "credentials": {"type": "object"},
                "organization": {"type": "string"},
                "baseUrl": {"type": "string"},
            }),
        ),
        schema_entry(
            XGitHubProject,
            json!({
                "name": {"type": "string"},
                "description": {"type": "string"},
                "visibility": {"type": "string", "enum": ["public", "private"]},
                "githubProviderRef": ref_property(),
            }),
        ),
        schema_entry(
            XKubeNet,
            json!({
                "dns": {
                    "type": "object",
                    "properties": {"domain": {"type": "string"}},
                },
                "vpc": {
                    "type": "object",
                    "properties": {"cidr": {"type": "string"}},
                },
            }),
        ),
        schema_entry(
            XKubeCluster,
            json!({
                "region": {"type": "string"},
                "version": {"type": "string"},
                "githubProjectRef": ref_property(),
                "kubeNetRef": ref_property(),
            }),
        ),
        schema_entry(
            XKubeSystem,
            json!({
                "kubeClusterRef": ref_property(),
                "components": {"type": "array", "items": {"type": "string"}},
            }),
        ),
        schema_entry(
            XKubEnv,
            json!({
                "environmentType": {"type": "string"},
                "resources": {
                    "type": "object",
                    "properties": {
                        "profile": {"type": "string"},
                        "defaults": {
                            "type": "object",
                            "properties": {
                                "requests": {
                                    "type": "object",
                                    "properties": {
                                        "cpu": {"type": "string"},
                                        "memory": {"type": "string"},
                                    },
                                },
                                "limits": {
                                    "type": "object",
                                    "properties": {
                                        "cpu": {"type": "string"},
                                        "memory": {"type": "string"},
                                    },
                                },
                            },
                        },
                    },
                },
                "environmentConfig": {
                    "type": "object",
                    "properties": {
                        "variables": {
                            "type": "object",
                            "additionalProperties": {"type": "string"},
                        }
                    },
                },
                "qualityGates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "ref": ref_property(),
                            "key": {"type": "string"},
                            "phase": {"type": "string"},
                            "required": {"type": "boolean"},
                        },
                    },
                },
                "kubeClusterRef": ref_property(),
            }),
        ),
        schema_entry(
            XQualityGate,
            json!({
                "key": {"type": "string"},
                "description": {"type": "string"},
                "category": {"type": "string"},
                "severity": {"type": "string"},
                "applicability": {
                    "type": "object",
                    "properties": {
                        "environments": {"type": "array", "items": {"type": "string"}},
                    },
                },
            }),
        ),
        schema_entry(
            XGitHubApp,
            json!({
                "githubProjectRef": ref_property(),
                "appName": {"type": "string"},
            }),
        ),
        schema_entry(
            XApp,
            json!({
                "type": {"type": "string"},
                "image": {"type": "string"},
                "port": {"type": "integer"},
                "githubProjectRef": ref_property(),
                "environments": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "kubenvRef": ref_property(),
                            "enabled": {"type": "boolean"},
                            "overrides": {"type": "object"},
                        },
                    },
                },
            }),
        ),
    ])
}

/// Registry handle. Construction is cheap; all state is shared statics.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn get_schema(&self, kind: &ResourceKind) -> Option<&'static ResourceSchema> {
        SCHEMAS.get(kind)
    }

    pub fn accessible_kinds(&self, kind: &ResourceKind) -> &'static [ResourceKind] {
        model::accessible_kinds(kind)
    }

    /// Map the external short form (`kubEnv`) to the typed kind
    /// (`XKubEnv`). Names already in kind form pass through.
    pub fn map_requested_name(&self, name: &str) -> Option<ResourceKind> {
        if let Some(kind) = model::kind_for_short_name(name) {
            return Some(kind);
        }
        let parsed: ResourceKind = name.parse().ok()?;
        parsed.is_platform_kind().then_some(parsed)
    }

    /// Direct relationship path between two kinds, when one exists.
    pub fn relationship_path(&self, from: &ResourceKind, to: &ResourceKind) -> Vec<String> {
        if from == to {
            return vec![model::short_name(from).to_string()];
        }
        if model::accessible_kinds(from).contains(to) {
            return vec![
                model::short_name(from).to_string(),
                model::short_name(to).to_string(),
            ];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_platform_kind_is_registered() {
        let registry = SchemaRegistry::new();
        for kind in ResourceKind::PLATFORM_KINDS {
            let schema = registry.get_schema(&kind).unwrap();
            assert_eq!(schema.kind, kind);
            assert_eq!(schema.api_version, model::api_version(&kind));
            assert!(schema.projection["properties"]["spec"].is_object());
        }
    }

    #[test]
    fn short_names_map_to_kinds() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            registry.map_requested_name("kubEnv"),
            Some(ResourceKind::XKubEnv)
        );
        assert_eq!(
            registry.map_requested_name("XKubeCluster"),
            Some(ResourceKind::XKubeCluster)
        );
        assert_eq!(registry.map_requested_name("Deployment"), None);
    }

    #[test]
    fn relationship_path_covers_direct_edges() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            registry.relationship_path(&ResourceKind::XApp, &ResourceKind::XKubEnv),
            vec!["app".to_string(), "kubEnv".to_string()]
        );
        assert!(registry
            .relationship_path(&ResourceKind::XQualityGate, &ResourceKind::XApp)
            .is_empty());
    }
}
