//! Multi-hop transitive discovery: evaluates declared reference-field
//! chains breadth-first with per-hop deadlines, bounded parallelism,
//! circuit breaking, intermediate-result caching and memory ceilings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use kubecore_cache::ReferenceCache;
use kubecore_cluster::{BreakerRegistry, BreakerState, ClusterClient, ListParams};
use kubecore_core::{model, ResourceKind, ResourceRef, TransitiveSettings};
use rustc_hash::FxHashSet;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::reverse::matches_reference;

/// A resource discovered at the end of a chain, with the path that led
/// to it. The path is representative: one sampled intermediate per hop,
/// not a cross-product.
#[derive(Debug, Clone)]
pub struct TransitiveHit {
    pub reference: ResourceRef,
    pub hops: usize,
    pub method: String,
    /// `source -> intermediates -> hit`; always `hops + 1` long.
    pub path: Vec<ResourceRef>,
    pub summary: Value,
}

impl TransitiveHit {
    pub fn intermediates(&self) -> &[ResourceRef] {
        if self.path.len() < 3 {
            &[]
        } else {
            &self.path[1..self.path.len() - 1]
        }
    }

    /// Human-readable chain of the traversal, excluding the hit itself.
    pub fn relationship_chain(&self) -> String {
        self.path[..self.path.len() - 1]
            .iter()
            .map(|r| format!("{}({})", r.kind, r.name))
            .collect::<Vec<_>>()
            .join(" \u{2192} ")
    }
}

#[derive(Debug, Clone)]
struct FoundResource {
    reference: ResourceRef,
    data: Value,
}

impl FoundResource {
    fn to_cache_value(&self) -> Value {
        json!({
            "name": self.reference.name,
            "namespace": self.reference.namespace,
            "apiVersion": self.reference.api_version,
            "kind": self.reference.kind,
            "data": self.data,
        })
    }

    fn from_cache_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?;
        let kind: ResourceKind = value.get("kind")?.as_str()?.parse().ok()?;
        let api_version = value.get("apiVersion")?.as_str()?;
        let namespace = value
            .get("namespace")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            reference: ResourceRef::new(api_version, kind, name, namespace),
            data: value.get("data").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Engine health snapshot, including per-kind breaker states.
#[derive(Debug, Clone)]
pub struct EngineHealth {
    pub total_api_calls: u64,
    pub failed_api_calls: u64,
    pub success_rate: f64,
    pub discovered_resources: u64,
    pub cache_entries: usize,
    pub estimated_memory_bytes: usize,
    pub breakers: Vec<(ResourceKind, BreakerState, u32)>,
    pub healthy: bool,
}

pub struct TransitiveEngine {
    client: Arc<dyn ClusterClient>,
    config: TransitiveSettings,
    cache: ReferenceCache,
    breakers: BreakerRegistry,
    total_api_calls: AtomicU64,
    failed_api_calls: AtomicU64,
    discovered_resources: AtomicU64,
}

impl TransitiveEngine {
    pub fn new(client: Arc<dyn ClusterClient>, config: TransitiveSettings) -> Self {
        let breakers = BreakerRegistry::new(config.circuit_breaker_threshold, config.cooldown());
        Self {
            client,
            config,
            cache: ReferenceCache::default(),
            breakers,
            total_api_calls: AtomicU64::new(0),
            failed_api_calls: AtomicU64::new(0),
            discovered_resources: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TransitiveSettings {
        &self.config
    }

    /// Discover resources related to `source` through the declared
    /// chains, grouped by target kind. Chain failures are isolated: one
    /// broken chain does not cancel the others.
    pub async fn discover(
        &self,
        source: &ResourceRef,
        max_depth: Option<usize>,
    ) -> HashMap<ResourceKind, Vec<TransitiveHit>> {
        let max_depth = max_depth.unwrap_or(self.config.max_depth);
        let chains = model::transitive_chains(&source.kind);
        if chains.is_empty() {
            debug!(kind = %source.kind, "no transitive chains declared");
            return HashMap::new();
        }

        if self.memory_exceeded() {
            warn!(
                estimated_bytes = self.cache.estimated_bytes(),
                limit_mb = self.config.memory_limit_mb,
                "memory ceiling reached before discovery, returning empty"
            );
            return HashMap::new();
        }

        let started = Instant::now();
        info!(source = %source, max_depth, "starting transitive discovery");

        let mut discovered: HashMap<ResourceKind, Vec<TransitiveHit>> = HashMap::new();

        for chain in chains {
            if chain.ref_fields.len() > max_depth {
                debug!(
                    target = %chain.target,
                    depth = chain.ref_fields.len(),
                    max_depth,
                    "skipping chain beyond depth budget"
                );
                continue;
            }

            if self.config.early_termination_enabled && !discovered.is_empty() {
                let total: usize = discovered.values().map(Vec::len).sum();
                if total >= self.config.max_resources_per_type * discovered.len() {
                    info!(total, "early termination: resource budget filled");
                    break;
                }
            }

            if started.elapsed() > self.config.timeout_per_depth() * chains.len() as u32
                || self.memory_exceeded()
            {
                warn!(elapsed_ms = started.elapsed().as_millis() as u64, "budget exceeded, returning partial results");
                break;
            }

            let hits = self.traverse_chain(source, chain).await;
            debug!(target = %chain.target, found = hits.len(), "chain traversal finished");
            if !hits.is_empty() {
                self.discovered_resources
                    .fetch_add(hits.len() as u64, Ordering::Relaxed);
                discovered
                    .entry(chain.target.clone())
                    .or_default()
                    .extend(hits);
            }
        }

        for hits in discovered.values_mut() {
            dedup_hits(hits);
        }

        let total: usize = discovered.values().map(Vec::len).sum();
        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            found = total,
            kinds = discovered.len(),
            "transitive discovery completed"
        );
        discovered
    }

    async fn traverse_chain(
        &self,
        source: &ResourceRef,
        chain: &model::ChainSpec,
    ) -> Vec<TransitiveHit> {
        let hops = chain.ref_fields.len();
        let mut current = vec![FoundResource {
            reference: source.clone(),
            data: Value::Null,
        }];
        let mut path = vec![source.clone()];

        for (index, ref_field) in chain.ref_fields.iter().enumerate() {
            if self.memory_exceeded() {
                warn!(hop = index + 1, "memory ceiling reached mid-chain, abandoning");
                return Vec::new();
            }

            let next = match timeout(
                self.config.timeout_per_depth(),
                self.expand_step(&current, ref_field),
            )
            .await
            {
                Ok(next) => next,
                Err(_) => {
                    warn!(
                        hop = index + 1,
                        field = ref_field,
                        "hop deadline expired, abandoning chain"
                    );
                    return Vec::new();
                }
            };

            if next.is_empty() {
                debug!(hop = index + 1, field = ref_field, "chain went dry");
                return Vec::new();
            }
            current = next;

            if index < hops - 1 {
                // Sample the first intermediate for the representative path.
                path.push(current[0].reference.clone());
            }
        }

        // Several kinds can carry the same reference field; only the
        // chain's declared target terminates it.
        current.retain(|found| found.reference.kind == chain.target);
        current.truncate(self.config.max_resources_per_type);
        current
            .into_iter()
            .map(|found| {
                let mut hit_path = path.clone();
                hit_path.push(found.reference.clone());
                TransitiveHit {
                    summary: json!({
                        "name": found.reference.name,
                        "kind": chain.target.to_string(),
                        "status": "discovered",
                        "discoveredBy": "transitive-lookup",
                    }),
                    reference: found.reference,
                    hops,
                    method: format!("transitive-{}", hops),
                    path: hit_path,
                }
            })
            .collect()
    }

    /// One hop: for every element of the current set, find the
    /// resources that reference it through `ref_field`.
    async fn expand_step(&self, current: &[FoundResource], ref_field: &str) -> Vec<FoundResource> {
        let mut merged = Vec::new();

        if current.len() > 1 && self.config.parallel_workers > 1 {
            let semaphore = Arc::new(Semaphore::new(self.config.parallel_workers));
            let tasks = current.iter().map(|resource| {
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore.acquire().await;
                    self.back_reference_search(ref_field, &resource.reference).await
                }
            });
            for found in join_all(tasks).await {
                merged.extend(found);
            }
        } else {
            for resource in current {
                merged.extend(self.back_reference_search(ref_field, &resource.reference).await);
            }
        }

        let mut seen = FxHashSet::default();
        merged.retain(|found| seen.insert(found.reference.clone()));
        merged
    }

    /// Who references `(target.name, target.namespace)` via `ref_field`?
    /// Consults the intermediate cache, the per-kind breakers, and the
    /// static searcher table.
    async fn back_reference_search(
        &self,
        ref_field: &str,
        target: &ResourceRef,
    ) -> Vec<FoundResource> {
        if self.config.cache_intermediate_results {
            if let Some(cached) =
                self.cache
                    .get(ref_field, &target.name, target.namespace.as_deref())
            {
                debug!(field = ref_field, target = %target.name, "intermediate cache hit");
                return cached
                    .iter()
                    .filter_map(FoundResource::from_cache_value)
                    .collect();
            }
        }

        let mut found: Vec<FoundResource> = Vec::new();
        for (kind, api_version) in model::searchers_for_field(ref_field) {
            if found.len() >= self.config.max_resources_per_type {
                break;
            }

            let breaker = self.breakers.breaker_for(kind);
            if !breaker.can_execute() {
                warn!(kind = %kind, "circuit breaker open, skipping kind");
                continue;
            }

            self.total_api_calls.fetch_add(1, Ordering::Relaxed);
            match self
                .client
                .list(api_version, kind, ListParams::with_limit(100))
                .await
            {
                Ok(listed) => {
                    breaker.record_success();
                    for item in &listed.items {
                        if found.len() >= self.config.max_resources_per_type {
                            break;
                        }
                        if !matches_reference(
                            item,
                            ref_field,
                            &target.name,
                            target.namespace.as_deref(),
                        ) {
                            continue;
                        }
                        let Some(name) = item.pointer("/metadata/name").and_then(Value::as_str)
                        else {
                            continue;
                        };
                        let namespace = item
                            .pointer("/metadata/namespace")
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        found.push(FoundResource {
                            reference: ResourceRef::new(
                                *api_version,
                                kind.clone(),
                                name,
                                namespace,
                            ),
                            data: item.clone(),
                        });
                    }
                }
                Err(e) => {
                    self.failed_api_calls.fetch_add(1, Ordering::Relaxed);
                    breaker.record_failure();
                    warn!(kind = %kind, field = ref_field, error = %e, "back-reference search failed");
                }
            }
        }

        if self.config.cache_intermediate_results {
            self.cache.put(
                ref_field,
                &target.name,
                target.namespace.as_deref(),
                found.iter().map(FoundResource::to_cache_value).collect(),
            );
        }
        found
    }

    fn memory_exceeded(&self) -> bool {
        self.config.memory_limit_mb > 0
            && self.cache.estimated_bytes() > self.config.memory_limit_mb * 1024 * 1024
    }

    pub fn health(&self) -> EngineHealth {
        let total = self.total_api_calls.load(Ordering::Relaxed);
        let failed = self.failed_api_calls.load(Ordering::Relaxed);
        let success_rate = if total == 0 {
            1.0
        } else {
            (total - failed) as f64 / total as f64
        };
        let breakers = self.breakers.states();
        let healthy = success_rate >= 0.5 && self.breakers.open_fraction() <= 0.5;
        EngineHealth {
            total_api_calls: total,
            failed_api_calls: failed,
            success_rate,
            discovered_resources: self.discovered_resources.load(Ordering::Relaxed),
            cache_entries: self.cache.len(),
            estimated_memory_bytes: self.cache.estimated_bytes(),
            breakers,
            healthy,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health().healthy
    }

    pub fn breaker_state(&self, kind: &ResourceKind) -> BreakerState {
        self.breakers.breaker_for(kind).state()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("cleared transitive intermediate cache");
    }

    pub fn reset_stats(&self) {
        self.total_api_calls.store(0, Ordering::Relaxed);
        self.failed_api_calls.store(0, Ordering::Relaxed);
        self.discovered_resources.store(0, Ordering::Relaxed);
    }
}

fn dedup_hits(hits: &mut Vec<TransitiveHit>) {
    let mut seen = FxHashSet::default();
    hits.retain(|hit| {
        seen.insert((
            hit.reference.name.clone(),
            hit.reference.namespace.clone(),
            hit.reference.kind.clone(),
        ))
    });
}
