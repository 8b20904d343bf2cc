//! Outbound reference extraction from opaque resource bodies.

use kubecore_core::{model, ResourceKind, ResourceRef};
use rustc_hash::FxHashSet;
use serde_json::Value;

/// Map a well-known reference field name to its target `(apiVersion,
/// kind)`. Only consulted when the reference object does not carry
/// explicit `apiVersion`/`kind`; explicit values always win.
pub fn infer_kind_from_field(field_name: &str) -> Option<(&'static str, ResourceKind)> {
    use ResourceKind::*;
    let inferred = match field_name {
        "githubProviderRef" => (model::GITHUB_API_VERSION, XGitHubProvider),
        "githubProjectRef" => (model::GITHUB_API_VERSION, XGitHubProject),
        "kubeClusterRef" => (model::PLATFORM_API_VERSION, XKubeCluster),
        "kubeNetRef" => (model::NETWORK_API_VERSION, XKubeNet),
        "kubenvRef" => (model::PLATFORM_API_VERSION, XKubEnv),
        _ => return None,
    };
    Some(inferred)
}

/// Parse one `{name, namespace?, apiVersion?, kind?}` object into a
/// typed reference. `field_name` drives kind inference; the namespace
/// defaults to the source resource's namespace.
pub fn parse_object_reference(
    value: &Value,
    field_name: &str,
    default_namespace: Option<&str>,
) -> Option<ResourceRef> {
    let name = value.get("name")?.as_str()?;
    if name.is_empty() {
        return None;
    }

    let explicit_api_version = value.get("apiVersion").and_then(Value::as_str);
    let explicit_kind = value.get("kind").and_then(Value::as_str);

    let (api_version, kind) = match (explicit_api_version, explicit_kind) {
        (Some(api_version), Some(kind)) => (
            api_version.to_string(),
            kind.parse().unwrap_or(ResourceKind::Other(kind.to_string())),
        ),
        _ => match infer_kind_from_field(field_name) {
            Some((api_version, kind)) => (api_version.to_string(), kind),
            // Conservative fallback for unknown reference fields.
            None => (
                "v1".to_string(),
                ResourceKind::Other("ConfigMap".to_string()),
            ),
        },
    };

    let namespace = value
        .get("namespace")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| default_namespace.map(str::to_string));

    Some(ResourceRef::new(api_version, kind, name, namespace))
}

/// Extract every outbound edge of a resource body: `*Ref` objects and
/// `*Refs` arrays anywhere under `.spec` and `.status`, plus
/// `metadata.ownerReferences`. Duplicates are removed preserving order.
pub fn extract_edges(data: &Value, default_namespace: Option<&str>) -> Vec<ResourceRef> {
    let mut edges = Vec::new();

    for section in ["spec", "status"] {
        if let Some(value) = data.get(section) {
            walk(value, default_namespace, &mut edges);
        }
    }

    if let Some(owners) = data
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
    {
        for owner in owners {
            let (Some(kind), Some(name)) = (
                owner.get("kind").and_then(Value::as_str),
                owner.get("name").and_then(Value::as_str),
            ) else {
                continue;
            };
            if kind.is_empty() || name.is_empty() {
                continue;
            }
            let api_version = owner
                .get("apiVersion")
                .and_then(Value::as_str)
                .unwrap_or("v1");
            edges.push(ResourceRef::new(
                api_version,
                kind.parse().unwrap_or(ResourceKind::Other(kind.to_string())),
                name,
                default_namespace.map(str::to_string),
            ));
        }
    }

    let mut seen = FxHashSet::default();
    edges.retain(|edge| seen.insert(edge.clone()));
    edges
}

fn walk(value: &Value, default_namespace: Option<&str>, out: &mut Vec<ResourceRef>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.ends_with("Ref") && child.is_object() {
                    if let Some(edge) = parse_object_reference(child, key, default_namespace) {
                        out.push(edge);
                    }
                } else if key.ends_with("Refs") && child.is_array() {
                    for item in child.as_array().into_iter().flatten() {
                        if let Some(edge) = parse_object_reference(item, key, default_namespace) {
                            out.push(edge);
                        }
                    }
                } else if child.is_object() || child.is_array() {
                    walk(child, default_namespace, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, default_namespace, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_api_version_and_kind_win_over_inference() {
        let reference = parse_object_reference(
            &json!({"name": "x", "apiVersion": "acme.io/v1", "kind": "Widget"}),
            "kubeClusterRef",
            None,
        )
        .unwrap();
        assert_eq!(reference.api_version, "acme.io/v1");
        assert_eq!(reference.kind, ResourceKind::Other("Widget".to_string()));
    }

    #[test]
    fn well_known_fields_infer_their_kinds() {
        let cases = [
            ("githubProjectRef", ResourceKind::XGitHubProject),
            ("kubeClusterRef", ResourceKind::XKubeCluster),
            ("kubenvRef", ResourceKind::XKubEnv),
            ("kubeNetRef", ResourceKind::XKubeNet),
            ("githubProviderRef", ResourceKind::XGitHubProvider),
        ];
        for (field, expected) in cases {
            let reference =
                parse_object_reference(&json!({"name": "x"}), field, None).unwrap();
            assert_eq!(reference.kind, expected, "field {}", field);
        }
    }

    #[test]
    fn unknown_fields_fall_back_to_configmap() {
        let reference =
            parse_object_reference(&json!({"name": "settings"}), "weirdRef", None).unwrap();
        assert_eq!(reference.api_version, "v1");
        assert_eq!(reference.kind, ResourceKind::Other("ConfigMap".to_string()));
    }

    #[test]
    fn namespace_defaults_to_source_namespace() {
        let reference = parse_object_reference(
            &json!({"name": "demo-dev"}),
            "kubenvRef",
            Some("test"),
        )
        .unwrap();
        assert_eq!(reference.namespace.as_deref(), Some("test"));

        let explicit = parse_object_reference(
            &json!({"name": "demo-dev", "namespace": "other"}),
            "kubenvRef",
            Some("test"),
        )
        .unwrap();
        assert_eq!(explicit.namespace.as_deref(), Some("other"));
    }

    #[test]
    fn extracts_nested_refs_ref_lists_and_owners() {
        let body = json!({
            "metadata": {
                "name": "art-api",
                "namespace": "default",
                "ownerReferences": [
                    {"apiVersion": "app.kubecore.io/v1alpha1", "kind": "XApp", "name": "parent"}
                ]
            },
            "spec": {
                "githubProjectRef": {"name": "demo-project", "namespace": "test"},
                "environments": [
                    {"kubenvRef": {"name": "demo-dev"}, "enabled": true},
                    {"kubenvRef": {"name": "demo-prod"}, "enabled": false}
                ]
            },
            "status": {
                "clusterRefs": [{"name": "c1", "apiVersion": "platform.kubecore.io/v1alpha1", "kind": "XKubeCluster"}]
            }
        });

        let edges = extract_edges(&body, Some("default"));
        let names: Vec<&str> = edges.iter().map(|edge| edge.name.as_str()).collect();
        for expected in ["demo-project", "demo-dev", "demo-prod", "c1", "parent"] {
            assert!(names.contains(&expected), "missing edge {}", expected);
        }
        assert_eq!(edges.len(), 5);

        // Nested environment refs inherit the source namespace.
        let env = edges.iter().find(|edge| edge.name == "demo-dev").unwrap();
        assert_eq!(env.kind, ResourceKind::XKubEnv);
        assert_eq!(env.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn duplicate_edges_are_removed() {
        let body = json!({
            "spec": {
                "kubeClusterRef": {"name": "c1"},
                "nested": {"kubeClusterRef": {"name": "c1"}}
            }
        });
        let edges = extract_edges(&body, None);
        assert_eq!(edges.len(), 1);
    }
}
