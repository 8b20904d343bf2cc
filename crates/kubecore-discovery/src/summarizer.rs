//! Schema-driven projection of resource bodies into bounded summaries.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use kubecore_core::{model, RelationType, ResolvedResource, ResourceRef, SchemaRegistry};
use serde_json::{json, Map, Value};
use tracing::debug;

const SUMMARY_CACHE_TTL: Duration = Duration::from_secs(300);
const MAX_OWNER_REFERENCES: usize = 5;

/// Fields always projected when no schema guides the extraction.
const PRIORITY_FIELDS: [&str; 17] = [
    "name",
    "namespace",
    "type",
    "image",
    "port",
    "version",
    "region",
    "credentials",
    "organization",
    "baseUrl",
    "environmentType",
    "components",
    "key",
    "description",
    "appName",
    "visibility",
    "environmentConfig",
];

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub max_depth: usize,
    pub max_array_elements: usize,
    pub max_string_length: usize,
    pub follow_schema: bool,
    pub include_status: bool,
    pub include_metadata: bool,
    pub cache_summaries: bool,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_array_elements: 10,
            max_string_length: 500,
            follow_schema: true,
            include_status: false,
            include_metadata: true,
            cache_summaries: true,
        }
    }
}

/// Bounded summary of one resource.
#[derive(Debug, Clone)]
pub struct ResourceSummary {
    pub reference: ResourceRef,
    /// Projected `.spec` fields at the top level, plus a `status` object
    /// when status projection is enabled.
    pub summary: Value,
    pub metadata: Value,
    pub edges: Vec<ResourceRef>,
    pub schema_version: String,
    extracted_at: Instant,
}

impl ResourceSummary {
    pub fn age(&self) -> Duration {
        self.extracted_at.elapsed()
    }
}

pub struct ResourceSummarizer {
    registry: SchemaRegistry,
    config: SummarizerConfig,
    cache: DashMap<ResourceRef, ResourceSummary>,
}

impl ResourceSummarizer {
    pub fn new(registry: SchemaRegistry, config: SummarizerConfig) -> Self {
        Self {
            registry,
            config,
            cache: DashMap::new(),
        }
    }

    /// Project a resolved resource into a summary. Summaries are cached
    /// per ref for five minutes; last write wins under contention.
    pub fn summarize(
        &self,
        resolved: &ResolvedResource,
        requested_fields: Option<&HashSet<String>>,
    ) -> ResourceSummary {
        if self.config.cache_summaries && requested_fields.is_none() {
            if let Some(cached) = self.cache.get(&resolved.reference) {
                if cached.age() < SUMMARY_CACHE_TTL {
                    return cached.clone();
                }
            }
        }

        debug!(reference = %resolved.reference, "summarizing resource");
        let schema = self.registry.get_schema(&resolved.reference.kind);

        let mut summary = Map::new();
        match schema {
            Some(schema) if self.config.follow_schema => {
                let spec_properties = schema
                    .projection
                    .pointer("/properties/spec/properties")
                    .cloned()
                    .unwrap_or(Value::Null);
                if let (Some(spec), Some(properties)) =
                    (resolved.data.get("spec"), spec_properties.as_object())
                {
                    summary = self.project_by_schema(spec, properties, requested_fields, 0);
                }
                if self.config.include_status {
                    if let Some(status) = resolved.data.get("status") {
                        let projected = self.project_priority_fields(status, requested_fields, 0);
                        if !projected.is_empty() {
                            summary.insert("status".to_string(), Value::Object(projected));
                        }
                    }
                }
            }
            _ => {
                if let Some(spec) = resolved.data.get("spec") {
                    summary = self.project_priority_fields(spec, requested_fields, 0);
                }
                if self.config.include_status {
                    if let Some(status) = resolved.data.get("status") {
                        let projected = self.project_priority_fields(status, requested_fields, 0);
                        if !projected.is_empty() {
                            summary.insert("status".to_string(), Value::Object(projected));
                        }
                    }
                }
            }
        }

        let result = ResourceSummary {
            reference: resolved.reference.clone(),
            summary: Value::Object(summary),
            metadata: if self.config.include_metadata {
                self.extract_metadata(&resolved.data)
            } else {
                json!({})
            },
            edges: resolved.edges.clone(),
            schema_version: schema.map(|s| s.api_version.to_string()).unwrap_or_default(),
            extracted_at: Instant::now(),
        };

        if self.config.cache_summaries && requested_fields.is_none() {
            self.cache.insert(resolved.reference.clone(), result.clone());
        }
        result
    }

    fn project_by_schema(
        &self,
        data: &Value,
        properties: &Map<String, Value>,
        requested_fields: Option<&HashSet<String>>,
        depth: usize,
    ) -> Map<String, Value> {
        let mut projected = Map::new();
        if depth >= self.config.max_depth {
            return projected;
        }

        for (field_name, field_schema) in properties {
            if let Some(requested) = requested_fields {
                if depth == 0 && !requested.contains(field_name) {
                    continue;
                }
            }
            let Some(value) = data.get(field_name) else {
                continue;
            };

            let field_type = field_schema
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("string");

            let extracted = match field_type {
                "object" => {
                    let nested = field_schema.get("properties").and_then(Value::as_object);
                    match (nested, value.as_object()) {
                        (Some(nested), Some(_)) => Value::Object(self.project_by_schema(
                            value,
                            nested,
                            None,
                            depth + 1,
                        )),
                        _ => self.sanitize_value(value),
                    }
                }
                "array" => self.project_array(
                    value,
                    field_schema.get("items").unwrap_or(&Value::Null),
                    depth,
                ),
                _ => self.sanitize_value(value),
            };
            projected.insert(field_name.clone(), extracted);
        }

        projected
    }

    fn project_priority_fields(
        &self,
        data: &Value,
        requested_fields: Option<&HashSet<String>>,
        depth: usize,
    ) -> Map<String, Value> {
        let mut projected = Map::new();
        if depth >= self.config.max_depth {
            return projected;
        }
        let Some(map) = data.as_object() else {
            return projected;
        };

        for (field_name, value) in map {
            let include = match requested_fields {
                Some(requested) => requested.contains(field_name),
                None => PRIORITY_FIELDS.contains(&field_name.as_str()),
            };
            if !include {
                continue;
            }

            let extracted = match value {
                Value::Object(_) => {
                    Value::Object(self.project_priority_fields(value, None, depth + 1))
                }
                Value::Array(_) => self.project_array(value, &Value::Null, depth),
                _ => self.sanitize_value(value),
            };
            projected.insert(field_name.clone(), extracted);
        }

        projected
    }

    fn project_array(&self, value: &Value, item_schema: &Value, depth: usize) -> Value {
        let Some(items) = value.as_array() else {
            return Value::Array(Vec::new());
        };

        let max = self.config.max_array_elements;
        let mut projected = Vec::new();
        for item in items.iter().take(max) {
            let extracted = match item {
                Value::Object(_) => {
                    match item_schema.get("properties").and_then(Value::as_object) {
                        Some(properties) => {
                            Value::Object(self.project_by_schema(item, properties, None, depth + 1))
                        }
                        None => {
                            Value::Object(self.project_priority_fields(item, None, depth + 1))
                        }
                    }
                }
                _ => self.sanitize_value(item),
            };
            projected.push(extracted);
        }

        if items.len() > max {
            projected.push(Value::String(format!(
                "... ({} more items)",
                items.len() - max
            )));
        }
        Value::Array(projected)
    }

    fn sanitize_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.truncate(s)),
            Value::Number(_) | Value::Bool(_) | Value::Null => value.clone(),
            // Complex values reaching the scalar path are flattened.
            other => Value::String(self.truncate(&other.to_string())),
        }
    }

    fn truncate(&self, s: &str) -> String {
        match s.char_indices().nth(self.config.max_string_length) {
            Some((offset, _)) => format!("{}...", &s[..offset]),
            None => s.to_string(),
        }
    }

    fn extract_metadata(&self, data: &Value) -> Value {
        let mut extracted = Map::new();
        let Some(metadata) = data.get("metadata").and_then(Value::as_object) else {
            return Value::Object(extracted);
        };

        for field in [
            "name",
            "namespace",
            "creationTimestamp",
            "generation",
            "resourceVersion",
            "uid",
            "labels",
            "annotations",
        ] {
            if let Some(value) = metadata.get(field) {
                extracted.insert(field.to_string(), self.sanitize_value(value));
            }
        }

        if let Some(owners) = metadata.get("ownerReferences").and_then(Value::as_array) {
            let projected: Vec<Value> = owners
                .iter()
                .take(MAX_OWNER_REFERENCES)
                .map(|owner| {
                    json!({
                        "apiVersion": owner.get("apiVersion"),
                        "kind": owner.get("kind"),
                        "name": owner.get("name"),
                    })
                })
                .collect();
            if !projected.is_empty() {
                extracted.insert("ownerReferences".to_string(), Value::Array(projected));
            }
        }

        Value::Object(extracted)
    }

    /// Group edges across summaries into `From -> To` buckets with the
    /// declared or inferred relation type.
    pub fn relationship_summary(
        &self,
        summaries: &[ResourceSummary],
    ) -> HashMap<String, Vec<Value>> {
        let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
        for summary in summaries {
            for edge in &summary.edges {
                let key = format!("{} -> {}", summary.reference.kind, edge.kind);
                grouped.entry(key).or_default().push(json!({
                    "source": summary.reference.to_string(),
                    "target": edge.to_string(),
                    "relationType": infer_relation(&summary.reference.kind, &edge.kind).to_string(),
                }));
            }
        }
        grouped
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

/// Relation between two kinds: the model's declared edge when present,
/// a name-based guess otherwise.
pub fn infer_relation(
    from: &kubecore_core::ResourceKind,
    to: &kubecore_core::ResourceKind,
) -> RelationType {
    if let Some(declared) = model::relation_between(from, to) {
        return declared;
    }
    let from_name = from.to_string().to_lowercase();
    let to_name = to.to_string().to_lowercase();
    if from_name.contains("cluster") && to_name.contains("net") {
        RelationType::Uses
    } else if from_name.contains("app") && to_name.contains("env") {
        RelationType::DeploysTo
    } else if from_name.contains("env") && to_name.contains("cluster") {
        RelationType::RunsOn
    } else if from_name.contains("project") {
        RelationType::Owns
    } else {
        RelationType::Uses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubecore_core::ResourceKind;
    use serde_json::json;

    fn summarizer() -> ResourceSummarizer {
        ResourceSummarizer::new(SchemaRegistry::new(), SummarizerConfig::default())
    }

    fn kubenv_resource() -> ResolvedResource {
        let reference = ResourceRef::new(
            "platform.kubecore.io/v1alpha1",
            ResourceKind::XKubEnv,
            "demo-dev",
            Some("test".to_string()),
        );
        ResolvedResource::new(
            reference,
            json!({
                "metadata": {
                    "name": "demo-dev",
                    "namespace": "test",
                    "uid": "abc-123",
                    "labels": {"env": "dev"},
                    "ownerReferences": [
                        {"apiVersion": "v1", "kind": "A", "name": "a1"},
                        {"apiVersion": "v1", "kind": "A", "name": "a2"},
                        {"apiVersion": "v1", "kind": "A", "name": "a3"},
                        {"apiVersion": "v1", "kind": "A", "name": "a4"},
                        {"apiVersion": "v1", "kind": "A", "name": "a5"},
                        {"apiVersion": "v1", "kind": "A", "name": "a6"}
                    ]
                },
                "spec": {
                    "environmentType": "dev",
                    "resources": {
                        "profile": "small",
                        "defaults": {
                            "requests": {"cpu": "100m", "memory": "128Mi"},
                            "limits": {"cpu": "500m", "memory": "512Mi"}
                        }
                    },
                    "notInSchema": "dropped",
                    "kubeClusterRef": {"name": "demo-cluster"}
                }
            }),
        )
    }

    #[test]
    fn schema_projection_keeps_declared_fields_only() {
        let summary = summarizer().summarize(&kubenv_resource(), None);
        assert_eq!(summary.summary["environmentType"], "dev");
        assert_eq!(summary.summary["resources"]["profile"], "small");
        assert!(summary.summary.get("notInSchema").is_none());
        assert_eq!(summary.schema_version, "platform.kubecore.io/v1alpha1");
    }

    #[test]
    fn depth_bound_cuts_deep_objects() {
        let config = SummarizerConfig {
            max_depth: 2,
            ..Default::default()
        };
        let summarizer = ResourceSummarizer::new(SchemaRegistry::new(), config);
        let summary = summarizer.summarize(&kubenv_resource(), None);
        // spec (depth 0) -> resources (depth 1) -> defaults (depth 2) is cut.
        assert_eq!(summary.summary["resources"]["profile"], "small");
        assert_eq!(summary.summary["resources"]["defaults"], json!({}));
    }

    #[test]
    fn long_strings_are_truncated() {
        let summarizer = ResourceSummarizer::new(
            SchemaRegistry::new(),
            SummarizerConfig {
                max_string_length: 10,
                ..Default::default()
            },
        );
        let reference = ResourceRef::new(
            "platform.kubecore.io/v1alpha1",
            ResourceKind::XQualityGate,
            "gate",
            None,
        );
        let resolved = ResolvedResource::new(
            reference,
            json!({"spec": {"description": "a very long description indeed"}}),
        );
        let summary = summarizer.summarize(&resolved, None);
        assert_eq!(summary.summary["description"], "a very lon...");
    }

    #[test]
    fn arrays_are_capped_with_truncation_sentinel() {
        let summarizer = ResourceSummarizer::new(
            SchemaRegistry::new(),
            SummarizerConfig {
                max_array_elements: 2,
                ..Default::default()
            },
        );
        let reference = ResourceRef::new(
            "platform.kubecore.io/v1alpha1",
            ResourceKind::XKubeSystem,
            "sys",
            None,
        );
        let resolved = ResolvedResource::new(
            reference,
            json!({"spec": {"components": ["argo", "crossplane", "ingress", "dns"]}}),
        );
        let summary = summarizer.summarize(&resolved, None);
        let components = summary.summary["components"].as_array().unwrap();
        assert_eq!(components.len(), 3);
        assert_eq!(components[2], "... (2 more items)");
    }

    #[test]
    fn unknown_kinds_use_priority_fields() {
        let reference = ResourceRef::new("v1", ResourceKind::Other("Widget".to_string()), "w", None);
        let resolved = ResolvedResource::new(
            reference,
            json!({"spec": {"type": "internal", "obscureField": true}}),
        );
        let summary = summarizer().summarize(&resolved, None);
        assert_eq!(summary.summary["type"], "internal");
        assert!(summary.summary.get("obscureField").is_none());
    }

    #[test]
    fn metadata_projection_caps_owner_references() {
        let summary = summarizer().summarize(&kubenv_resource(), None);
        let owners = summary.metadata["ownerReferences"].as_array().unwrap();
        assert_eq!(owners.len(), 5);
        assert_eq!(summary.metadata["uid"], "abc-123");
        assert_eq!(summary.metadata["labels"], "{\"env\":\"dev\"}");
    }

    #[test]
    fn summaries_are_cached_per_ref() {
        let summarizer = summarizer();
        let resource = kubenv_resource();
        summarizer.summarize(&resource, None);
        assert_eq!(summarizer.cache_size(), 1);
        summarizer.summarize(&resource, None);
        assert_eq!(summarizer.cache_size(), 1);
        summarizer.clear_cache();
        assert_eq!(summarizer.cache_size(), 0);
    }

    #[test]
    fn relation_inference_prefers_declared_edges() {
        assert_eq!(
            infer_relation(&ResourceKind::XApp, &ResourceKind::XKubEnv),
            RelationType::DeploysTo
        );
        assert_eq!(
            infer_relation(
                &ResourceKind::Other("MyCluster".to_string()),
                &ResourceKind::Other("MyNet".to_string())
            ),
            RelationType::Uses
        );
    }
}
