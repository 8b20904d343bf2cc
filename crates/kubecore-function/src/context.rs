//! Typed response model: the platform context returned to the
//! composition engine.

use std::collections::BTreeMap;

use kubecore_core::{Cardinality, DiscoveryMethod};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requestor {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    pub api_version: String,
    pub kind: String,
    pub accessible: bool,
    pub relationship_path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_method: Option<DiscoveryMethod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInstance {
    pub name: String,
    pub namespace: String,
    pub summary: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaBlock {
    pub metadata: SchemaMetadata,
    pub instances: Vec<SchemaInstance>,
    /// Full projection schema, present only when the query asked for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl SchemaBlock {
    /// Enforce the per-block output contract: instances unique by
    /// `(name, namespace)` and sorted for deterministic responses.
    pub fn dedup_and_sort(&mut self) {
        self.instances
            .sort_by(|a, b| (&a.name, &a.namespace).cmp(&(&b.name, &b.namespace)));
        self.instances
            .dedup_by(|a, b| a.name == b.name && a.namespace == b.namespace);
    }

    pub fn contains_instance(&self, name: &str, namespace: &str) -> bool {
        self.instances
            .iter()
            .any(|instance| instance.name == name && instance.namespace == namespace)
    }
}

fn deserialize_cardinality<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Cardinality, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.as_str() {
        "1:1" => Ok(Cardinality::OneToOne),
        "1:N" => Ok(Cardinality::OneToMany),
        "N:N" => Ok(Cardinality::ManyToMany),
        other => Err(serde::de::Error::custom(format!(
            "unknown cardinality: {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectRelationship {
    #[serde(rename = "type")]
    pub target: String,
    #[serde(deserialize_with = "deserialize_cardinality")]
    pub cardinality: Cardinality,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Relationships {
    pub direct: Vec<DirectRelationship>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub suggestion: String,
    pub impact: Impact,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub rule: String,
    pub description: String,
    pub severity: RuleSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedReference {
    #[serde(rename = "type")]
    pub target: String,
    pub purpose: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub recommendations: Vec<Recommendation>,
    pub validation_rules: Vec<ValidationRule>,
    pub suggested_references: Vec<SuggestedReference>,
}

/// The response core handed to the output stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformContext {
    pub requestor: Requestor,
    /// BTreeMap keeps schema-block keys in a stable order.
    pub available_schemas: BTreeMap<String, SchemaBlock>,
    pub relationships: Relationships,
    pub insights: Insights,
}

impl PlatformContext {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            requestor: Requestor {
                kind: kind.into(),
                name: name.into(),
                namespace: namespace.into(),
            },
            available_schemas: BTreeMap::new(),
            relationships: Relationships::default(),
            insights: Insights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_dedup_and_sort_is_stable() {
        let mut block = SchemaBlock {
            metadata: SchemaMetadata {
                api_version: "platform.kubecore.io/v1alpha1".to_string(),
                kind: "XKubEnv".to_string(),
                accessible: true,
                relationship_path: vec!["app".to_string(), "kubEnv".to_string()],
                discovery_method: None,
            },
            schema: None,
            instances: vec![
                SchemaInstance {
                    name: "b".to_string(),
                    namespace: "ns".to_string(),
                    summary: json!({}),
                },
                SchemaInstance {
                    name: "a".to_string(),
                    namespace: "ns".to_string(),
                    summary: json!({"first": true}),
                },
                SchemaInstance {
                    name: "a".to_string(),
                    namespace: "ns".to_string(),
                    summary: json!({"second": true}),
                },
            ],
        };
        block.dedup_and_sort();
        assert_eq!(block.instances.len(), 2);
        assert_eq!(block.instances[0].name, "a");
        assert_eq!(block.instances[1].name, "b");
    }

    #[test]
    fn context_round_trips_through_json() {
        let mut context = PlatformContext::new("XApp", "art-api", "default");
        context.relationships.direct.push(DirectRelationship {
            target: "kubEnv".to_string(),
            cardinality: Cardinality::ManyToMany,
            description: "app deploysTo kubEnv".to_string(),
        });
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["requestor"]["type"], "XApp");
        assert_eq!(value["relationships"]["direct"][0]["cardinality"], "N:N");

        let back: PlatformContext = serde_json::from_value(value).unwrap();
        assert_eq!(back, context);
    }
}
