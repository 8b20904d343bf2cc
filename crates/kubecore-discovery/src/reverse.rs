//! Reverse discovery: who points at a given target, via the declared
//! searcher triples in the platform model.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use kubecore_cluster::{ClusterClient, ListParams};
use kubecore_core::{model, ResourceKind, ResourceRef};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Check whether a resource's `.spec` references the target through
/// `ref_field`. Single-object fields (`…Ref`) and reference arrays
/// (items may nest the ref under a `ref` key) are both handled. When
/// the target has no namespace, any referenced namespace matches.
pub fn matches_reference(
    resource: &Value,
    ref_field: &str,
    target_name: &str,
    target_namespace: Option<&str>,
) -> bool {
    let Some(field_value) = resource.pointer(&format!("/spec/{}", ref_field)) else {
        return false;
    };

    let matches_object = |candidate: &Value| {
        candidate.get("name").and_then(Value::as_str) == Some(target_name)
            && match target_namespace {
                Some(ns) => candidate.get("namespace").and_then(Value::as_str) == Some(ns),
                None => true,
            }
    };

    if ref_field.ends_with("Ref") {
        return field_value.is_object() && matches_object(field_value);
    }

    field_value
        .as_array()
        .map(|items| {
            items.iter().any(|item| {
                let candidate = item.get("ref").unwrap_or(item);
                candidate.is_object() && matches_object(candidate)
            })
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct ReverseConfig {
    pub list_limit: usize,
    pub parallel: bool,
}

impl Default for ReverseConfig {
    fn default() -> Self {
        Self {
            list_limit: 100,
            parallel: true,
        }
    }
}

pub struct ReverseDiscovery {
    client: Arc<dyn ClusterClient>,
    config: ReverseConfig,
}

impl ReverseDiscovery {
    pub fn new(client: Arc<dyn ClusterClient>, config: ReverseConfig) -> Self {
        Self { client, config }
    }

    /// Find inbound references to `(target_kind, name, namespace)`,
    /// grouped by the searcher kind's reference-list key
    /// (e.g. `XApp -> appRefs`). Per-searcher failures are logged and
    /// skipped so the remaining searchers still report.
    pub async fn discover(
        &self,
        target_kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> HashMap<String, Vec<ResourceRef>> {
        let searchers = model::reverse_search(target_kind);
        if searchers.is_empty() {
            debug!(kind = %target_kind, "no reverse searchers declared");
            return HashMap::new();
        }

        let mut discovered: HashMap<String, Vec<ResourceRef>> = HashMap::new();

        if self.config.parallel && searchers.len() > 1 {
            let tasks = searchers.iter().map(|searcher| async move {
                let found = self
                    .search_one(searcher.kind.clone(), searcher.api_version, searcher.ref_field, name, namespace)
                    .await;
                (searcher.kind.clone(), found)
            });
            for (kind, found) in join_all(tasks).await {
                if !found.is_empty() {
                    discovered.insert(model::ref_list_key(&kind).to_string(), found);
                }
            }
        } else {
            for searcher in searchers {
                let found = self
                    .search_one(searcher.kind.clone(), searcher.api_version, searcher.ref_field, name, namespace)
                    .await;
                if !found.is_empty() {
                    discovered.insert(model::ref_list_key(&searcher.kind).to_string(), found);
                }
            }
        }

        let total: usize = discovered.values().map(Vec::len).sum();
        info!(
            target = %target_kind,
            name,
            found = total,
            groups = discovered.len(),
            "reverse discovery completed"
        );
        discovered
    }

    async fn search_one(
        &self,
        searcher_kind: ResourceKind,
        api_version: &str,
        ref_field: &str,
        target_name: &str,
        target_namespace: Option<&str>,
    ) -> Vec<ResourceRef> {
        let listed = match self
            .client
            .list(
                api_version,
                &searcher_kind,
                ListParams::with_limit(self.config.list_limit),
            )
            .await
        {
            Ok(listed) => listed,
            Err(e) => {
                warn!(kind = %searcher_kind, error = %e, "reverse search failed, skipping kind");
                return Vec::new();
            }
        };

        let found: Vec<ResourceRef> = listed
            .items
            .iter()
            .filter(|item| matches_reference(item, ref_field, target_name, target_namespace))
            .filter_map(|item| {
                let name = item.pointer("/metadata/name")?.as_str()?;
                let namespace = item
                    .pointer("/metadata/namespace")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(ResourceRef::new(
                    api_version,
                    searcher_kind.clone(),
                    name,
                    namespace,
                ))
            })
            .collect();

        debug!(
            kind = %searcher_kind,
            field = ref_field,
            found = found.len(),
            "reverse search finished"
        );
        found
    }
}
