//! Output-document assembly: requestor-specific summary filtering,
//! the fixed envelope, and structural validation.

use kubecore_core::{KubeCoreError, ResourceKind, Result};
use serde_json::{json, Map, Value};

use crate::context::PlatformContext;

pub const OUTPUT_API_VERSION: &str = "context.fn.kubecore.io/v1beta1";
pub const OUTPUT_KIND: &str = "Output";

/// Discovery provenance fields pass every filter so merged blocks keep
/// their origin story.
const DISCOVERY_FIELDS: [&str; 8] = [
    "name",
    "kind",
    "status",
    "discoveredBy",
    "discoveryHops",
    "discoveryMethod",
    "relationshipChain",
    "intermediateResources",
];

fn summary_keep_list(kind: &ResourceKind) -> Option<&'static [&'static str]> {
    use ResourceKind::*;
    match kind {
        XApp => Some(&[
            "environmentType",
            "resources",
            "environmentConfig",
            "qualityGates",
            "repository",
            "cicdEnabled",
        ]),
        XKubeSystem => Some(&[
            "version",
            "region",
            "nodeCount",
            "status",
            "systemComponents",
            "capacity",
        ]),
        XKubEnv => Some(&[
            "environmentType",
            "resources",
            "qualityGates",
            "capacity",
            "systemComponents",
        ]),
        _ => None,
    }
}

fn filter_summary(summary: &Value, requestor_kind: &ResourceKind) -> Value {
    let Some(keep) = summary_keep_list(requestor_kind) else {
        return summary.clone();
    };
    let Some(map) = summary.as_object() else {
        return summary.clone();
    };

    let filtered: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| {
            keep.contains(&key.as_str()) || DISCOVERY_FIELDS.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(filtered)
}

/// Assemble the output document, projecting instance summaries down to
/// the fields relevant to the requestor kind.
pub fn build_output(platform: &PlatformContext, requestor_kind: &ResourceKind) -> Result<Value> {
    let mut shaped = platform.clone();
    for block in shaped.available_schemas.values_mut() {
        for instance in &mut block.instances {
            instance.summary = filter_summary(&instance.summary, requestor_kind);
        }
    }

    Ok(json!({
        "apiVersion": OUTPUT_API_VERSION,
        "kind": OUTPUT_KIND,
        "spec": {
            "platformContext": serde_json::to_value(&shaped)?,
        }
    }))
}

/// Structural validation of the output document. A failure here is
/// fatal for the query.
pub fn validate_output(output: &Value) -> Result<()> {
    fn fail(message: impl Into<String>) -> Result<()> {
        Err(KubeCoreError::Validation(message.into()))
    }

    if output.get("apiVersion").and_then(Value::as_str) != Some(OUTPUT_API_VERSION) {
        return fail(format!("apiVersion must be {}", OUTPUT_API_VERSION));
    }
    if output.get("kind").and_then(Value::as_str) != Some(OUTPUT_KIND) {
        return fail(format!("kind must be {}", OUTPUT_KIND));
    }

    let Some(platform) = output.pointer("/spec/platformContext").filter(|v| v.is_object()) else {
        return fail("spec.platformContext is required");
    };

    let Some(requestor) = platform.get("requestor").and_then(Value::as_object) else {
        return fail("platformContext.requestor is required");
    };
    for field in ["type", "name", "namespace"] {
        if !requestor.contains_key(field) {
            return fail(format!("requestor.{} is required", field));
        }
    }

    let Some(schemas) = platform.get("availableSchemas").and_then(Value::as_object) else {
        return fail("platformContext.availableSchemas is required");
    };
    for (name, block) in schemas {
        let Some(metadata) = block.get("metadata").and_then(Value::as_object) else {
            return fail(format!("schema {} has no metadata", name));
        };
        for field in ["apiVersion", "kind", "accessible", "relationshipPath"] {
            if !metadata.contains_key(field) {
                return fail(format!("schema {} metadata lacks {}", name, field));
            }
        }
        let Some(instances) = block.get("instances").and_then(Value::as_array) else {
            return fail(format!("schema {} has no instances list", name));
        };
        for instance in instances {
            for field in ["name", "namespace", "summary"] {
                if instance.get(field).is_none() {
                    return fail(format!("schema {} instance lacks {}", name, field));
                }
            }
            if !instance["summary"].is_object() {
                return fail(format!("schema {} instance summary must be an object", name));
            }
        }
    }

    if !platform
        .get("relationships")
        .map(Value::is_object)
        .unwrap_or(false)
    {
        return fail("platformContext.relationships is required");
    }
    if !platform.get("insights").map(Value::is_object).unwrap_or(false) {
        return fail("platformContext.insights is required");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SchemaBlock, SchemaInstance, SchemaMetadata};
    use kubecore_core::DiscoveryMethod;

    fn context_with_instance(summary: Value) -> PlatformContext {
        let mut platform = PlatformContext::new("XApp", "art-api", "default");
        platform.available_schemas.insert(
            "kubEnv".to_string(),
            SchemaBlock {
                metadata: SchemaMetadata {
                    api_version: "platform.kubecore.io/v1alpha1".to_string(),
                    kind: "XKubEnv".to_string(),
                    accessible: true,
                    relationship_path: vec!["app".to_string(), "kubEnv".to_string()],
                    discovery_method: Some(DiscoveryMethod::Direct),
                },
                instances: vec![SchemaInstance {
                    name: "demo-dev".to_string(),
                    namespace: "test".to_string(),
                    summary,
                }],
                schema: None,
            },
        );
        platform
    }

    #[test]
    fn output_passes_validation() {
        let platform = context_with_instance(json!({"environmentType": "dev"}));
        let output = build_output(&platform, &ResourceKind::XApp).unwrap();
        validate_output(&output).unwrap();
        assert_eq!(output["apiVersion"], OUTPUT_API_VERSION);
        assert_eq!(
            output["spec"]["platformContext"]["requestor"]["type"],
            "XApp"
        );
    }

    #[test]
    fn app_requestor_summaries_are_filtered() {
        let platform = context_with_instance(json!({
            "environmentType": "dev",
            "resources": {"profile": "small"},
            "kubeClusterRef": {"name": "demo-cluster"},
            "discoveryHops": 2,
        }));
        let output = build_output(&platform, &ResourceKind::XApp).unwrap();
        let summary = &output["spec"]["platformContext"]["availableSchemas"]["kubEnv"]["instances"]
            [0]["summary"];
        assert_eq!(summary["environmentType"], "dev");
        assert_eq!(summary["discoveryHops"], 2);
        assert!(summary.get("kubeClusterRef").is_none());
    }

    #[test]
    fn other_requestors_keep_full_summaries() {
        let platform = context_with_instance(json!({"anything": "goes"}));
        let output = build_output(&platform, &ResourceKind::XGitHubProject).unwrap();
        let summary = &output["spec"]["platformContext"]["availableSchemas"]["kubEnv"]["instances"]
            [0]["summary"];
        assert_eq!(summary["anything"], "goes");
    }

    #[test]
    fn validation_rejects_malformed_documents() {
        assert!(validate_output(&json!({})).is_err());
        assert!(validate_output(&json!({
            "apiVersion": OUTPUT_API_VERSION,
            "kind": "Wrong",
        }))
        .is_err());

        let missing_requestor = json!({
            "apiVersion": OUTPUT_API_VERSION,
            "kind": OUTPUT_KIND,
            "spec": {"platformContext": {"availableSchemas": {}}}
        });
        assert!(validate_output(&missing_requestor).is_err());

        let bad_block = json!({
            "apiVersion": OUTPUT_API_VERSION,
            "kind": OUTPUT_KIND,
            "spec": {"platformContext": {
                "requestor": {"type": "XApp", "name": "a", "namespace": "b"},
                "availableSchemas": {"kubEnv": {"instances": []}},
                "relationships": {"direct": []},
                "insights": {}
            }}
        });
        assert!(validate_output(&bad_block).is_err());
    }
}
