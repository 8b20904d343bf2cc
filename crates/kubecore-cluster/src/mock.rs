//! In-memory cluster client used by the test suites: serves objects
//! from a fixture set, counts calls, and injects failures per kind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use kubecore_core::{KubeCoreError, ResourceKind, Result};
use parking_lot::Mutex;
use serde_json::Value;

use crate::client::{ClusterClient, ListParams, ListResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Transient,
    Forbidden,
    NotFound,
}

impl InjectedFailure {
    fn to_error(self, kind: &ResourceKind) -> KubeCoreError {
        match self {
            InjectedFailure::Transient => {
                KubeCoreError::Transient(format!("injected transient failure for {}", kind))
            }
            InjectedFailure::Forbidden => {
                KubeCoreError::Forbidden(format!("injected forbidden for {}", kind))
            }
            InjectedFailure::NotFound => {
                KubeCoreError::NotFound(format!("injected not-found for {}", kind))
            }
        }
    }
}

#[derive(Debug)]
struct FailurePlan {
    failure: InjectedFailure,
    // None means fail forever.
    remaining: Option<u32>,
}

#[derive(Default)]
pub struct MockClusterClient {
    resources: Mutex<Vec<Value>>,
    list_failures: Mutex<HashMap<ResourceKind, FailurePlan>>,
    get_calls: AtomicU64,
    list_calls: Mutex<HashMap<ResourceKind, u64>>,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a full resource object. `kind` and `metadata.name` must be set.
    pub fn insert(&self, resource: Value) {
        assert!(resource.get("kind").is_some(), "mock resource needs a kind");
        assert!(
            resource.pointer("/metadata/name").is_some(),
            "mock resource needs metadata.name"
        );
        self.resources.lock().push(resource);
    }

    /// Fail the next `times` list calls for `kind`.
    pub fn fail_list_times(&self, kind: ResourceKind, failure: InjectedFailure, times: u32) {
        self.list_failures.lock().insert(
            kind,
            FailurePlan {
                failure,
                remaining: Some(times),
            },
        );
    }

    /// Fail every list call for `kind` until cleared.
    pub fn fail_list_always(&self, kind: ResourceKind, failure: InjectedFailure) {
        self.list_failures.lock().insert(
            kind,
            FailurePlan {
                failure,
                remaining: None,
            },
        );
    }

    pub fn clear_failures(&self) {
        self.list_failures.lock().clear();
    }

    pub fn get_call_count(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    pub fn list_call_count(&self, kind: &ResourceKind) -> u64 {
        self.list_calls.lock().get(kind).copied().unwrap_or(0)
    }

    fn take_failure(&self, kind: &ResourceKind) -> Option<KubeCoreError> {
        let mut failures = self.list_failures.lock();
        let (error, exhausted) = match failures.get_mut(kind) {
            None => return None,
            Some(plan) => {
                let error = plan.failure.to_error(kind);
                match &mut plan.remaining {
                    None => (Some(error), false),
                    Some(n) if *n > 1 => {
                        *n -= 1;
                        (Some(error), false)
                    }
                    Some(n) if *n == 1 => (Some(error), true),
                    Some(_) => (None, true),
                }
            }
        };
        if exhausted {
            failures.remove(kind);
        }
        error
    }
}

fn matches_kind(resource: &Value, kind: &ResourceKind) -> bool {
    resource.get("kind").and_then(Value::as_str) == Some(kind.to_string().as_str())
}

fn resource_namespace(resource: &Value) -> Option<&str> {
    resource.pointer("/metadata/namespace").and_then(Value::as_str)
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn get(
        &self,
        _api_version: &str,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Value> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        let resources = self.resources.lock();
        resources
            .iter()
            .find(|resource| {
                matches_kind(resource, kind)
                    && resource.pointer("/metadata/name").and_then(Value::as_str) == Some(name)
                    && (namespace.is_none() || resource_namespace(resource) == namespace)
            })
            .cloned()
            .ok_or_else(|| {
                KubeCoreError::NotFound(format!(
                    "{}/{}/{}",
                    kind,
                    namespace.unwrap_or("-"),
                    name
                ))
            })
    }

    async fn list(
        &self,
        _api_version: &str,
        kind: &ResourceKind,
        params: ListParams,
    ) -> Result<ListResult> {
        *self.list_calls.lock().entry(kind.clone()).or_insert(0) += 1;

        if let Some(error) = self.take_failure(kind) {
            return Err(error);
        }

        let resources = self.resources.lock();
        let limit = if params.limit == 0 { 100 } else { params.limit };
        let items: Vec<Value> = resources
            .iter()
            .filter(|resource| {
                matches_kind(resource, kind)
                    && params
                        .namespace
                        .as_deref()
                        .map(|ns| resource_namespace(resource) == Some(ns))
                        .unwrap_or(true)
            })
            .take(limit)
            .cloned()
            .collect();

        Ok(ListResult {
            items,
            continue_token: None,
        })
    }
}
