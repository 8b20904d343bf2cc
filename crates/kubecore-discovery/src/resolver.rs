//! Forward resolution: expand a seed reference into a set of resolved
//! resources by following outbound edges breadth-first under depth and
//! count budgets, with cycle detection and a per-ref TTL cache.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use kubecore_core::{model, KubeCoreError, RelationType, ResolvedResource, ResourceRef, Result};
use kubecore_cluster::ClusterClient;
use rustc_hash::FxHashSet;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::extract::extract_edges;

/// Budgets and bookkeeping for one resolution walk. Not shared between
/// queries; each walk threads its own context.
#[derive(Debug)]
pub struct ResolutionContext {
    pub max_depth: usize,
    pub max_resources: usize,
    visited: FxHashSet<ResourceRef>,
    path: Vec<ResourceRef>,
    resolved_count: usize,
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self::new(5, 100)
    }
}

impl ResolutionContext {
    pub fn new(max_depth: usize, max_resources: usize) -> Self {
        Self {
            max_depth,
            max_resources,
            visited: FxHashSet::default(),
            path: Vec::new(),
            resolved_count: 0,
        }
    }

    fn path_string(&self, next: &ResourceRef) -> String {
        let mut parts: Vec<String> = self.path.iter().map(ToString::to_string).collect();
        parts.push(next.to_string());
        parts.join(" -> ")
    }
}

/// Forward resolver configuration.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub cache_ttl: Duration,
    pub max_concurrent: usize,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            max_concurrent: 10,
        }
    }
}

pub struct ResourceResolver {
    client: Arc<dyn ClusterClient>,
    cache: DashMap<ResourceRef, ResolvedResource>,
    cache_ttl: Duration,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ResourceResolver {
    pub fn new(client: Arc<dyn ClusterClient>, config: ForwardConfig) -> Self {
        Self {
            client,
            cache: DashMap::new(),
            cache_ttl: config.cache_ttl,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    /// Resolve a single reference, honoring the context's budgets.
    pub async fn resolve_resource(
        &self,
        reference: &ResourceRef,
        context: &mut ResolutionContext,
    ) -> Result<ResolvedResource> {
        if let Some(cached) = self.cache.get(reference) {
            if cached.resolved_at.elapsed() < self.cache_ttl {
                debug!(reference = %reference, "cache hit");
                let mut resolved = cached.clone();
                resolved.cached = true;
                return Ok(resolved);
            }
            drop(cached);
            self.cache.remove(reference);
        }

        if context.visited.contains(reference) {
            return Err(KubeCoreError::CircularDependency(
                context.path_string(reference),
            ));
        }
        if context.path.len() >= context.max_depth {
            return Err(KubeCoreError::ResolutionLimit(format!(
                "maximum resolution depth ({}) exceeded",
                context.max_depth
            )));
        }
        if context.resolved_count >= context.max_resources {
            return Err(KubeCoreError::ResolutionLimit(format!(
                "maximum resource count ({}) exceeded",
                context.max_resources
            )));
        }

        context.visited.insert(reference.clone());
        context.path.push(reference.clone());
        context.resolved_count += 1;

        let outcome = self.fetch(reference).await;
        context.path.pop();
        outcome
    }

    async fn fetch(&self, reference: &ResourceRef) -> Result<ResolvedResource> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| KubeCoreError::Connection("resolver semaphore closed".to_string()))?;

        debug!(reference = %reference, "resolving resource");
        let data = self
            .client
            .get(
                &reference.api_version,
                &reference.kind,
                &reference.name,
                reference.namespace.as_deref(),
            )
            .await?;

        let mut resolved = ResolvedResource::new(reference.clone(), data);
        resolved.edges = extract_edges(&resolved.data, reference.namespace.as_deref());
        debug!(
            reference = %reference,
            edges = resolved.edges.len(),
            "resolved resource"
        );

        self.cache.insert(reference.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Resolve a seed and everything reachable from it over the declared
    /// relation types, breadth-first. Per-ref failures are logged and
    /// skipped; the walk continues.
    pub async fn resolve_with_relationships(
        &self,
        seed: &ResourceRef,
        max_depth: usize,
        max_resources: usize,
        relation_types: Option<&HashSet<RelationType>>,
    ) -> HashMap<ResourceRef, ResolvedResource> {
        let mut context = ResolutionContext::new(max_depth, max_resources);
        let mut resolved: HashMap<ResourceRef, ResolvedResource> = HashMap::new();
        let mut pending: VecDeque<(ResourceRef, usize)> = VecDeque::from([(seed.clone(), 0)]);

        while let Some((current, depth)) = pending.pop_front() {
            if context.resolved_count >= max_resources {
                break;
            }
            if resolved.contains_key(&current) {
                continue;
            }

            let resource = match self.resolve_resource(&current, &mut context).await {
                Ok(resource) => resource,
                Err(e) => {
                    warn!(reference = %current, error = %e, "failed to resolve, continuing");
                    continue;
                }
            };

            if depth < max_depth {
                for edge in &resource.edges {
                    if resolved.contains_key(edge) || pending.iter().any(|(r, _)| r == edge) {
                        continue;
                    }
                    let relation = model::relation_between(&current.kind, &edge.kind);
                    let follow = match (relation, relation_types) {
                        (Some(relation), Some(allowed)) => allowed.contains(&relation),
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    if follow {
                        pending.push_back((edge.clone(), depth + 1));
                    }
                }
            }

            resolved.insert(current, resource);
        }

        info!(
            seed = %seed,
            resolved = resolved.len(),
            "forward resolution completed"
        );
        resolved
    }

    /// Resolve many references concurrently, yielding a per-input
    /// outcome. Each input gets its own resolution context.
    pub async fn resolve_parallel(
        &self,
        references: &[ResourceRef],
    ) -> HashMap<ResourceRef, Result<ResolvedResource>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let tasks = references.iter().map(|reference| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await;
                let mut context = ResolutionContext::default();
                let outcome = self.resolve_resource(reference, &mut context).await;
                (reference.clone(), outcome)
            }
        });

        let results: HashMap<ResourceRef, Result<ResolvedResource>> =
            join_all(tasks).await.into_iter().collect();

        let succeeded = results.values().filter(|r| r.is_ok()).count();
        info!(
            requested = references.len(),
            succeeded, "parallel resolution completed"
        );
        results
    }

    /// Post-hoc cycle report over a resolved set: every path that
    /// revisits a reference through the extracted edges.
    pub fn detect_cycles(
        resolved: &HashMap<ResourceRef, ResolvedResource>,
    ) -> Vec<Vec<ResourceRef>> {
        fn dfs(
            current: &ResourceRef,
            resolved: &HashMap<ResourceRef, ResolvedResource>,
            visited: &mut HashSet<ResourceRef>,
            path: &mut Vec<ResourceRef>,
            cycles: &mut Vec<Vec<ResourceRef>>,
        ) {
            if let Some(position) = path.iter().position(|r| r == current) {
                let mut cycle = path[position..].to_vec();
                cycle.push(current.clone());
                cycles.push(cycle);
                return;
            }
            if visited.contains(current) {
                return;
            }
            visited.insert(current.clone());
            path.push(current.clone());
            if let Some(resource) = resolved.get(current) {
                for edge in &resource.edges {
                    if resolved.contains_key(edge) {
                        dfs(edge, resolved, visited, path, cycles);
                    }
                }
            }
            path.pop();
        }

        let mut cycles = Vec::new();
        let mut visited = HashSet::new();
        for reference in resolved.keys() {
            if !visited.contains(reference) {
                let mut path = Vec::new();
                dfs(reference, resolved, &mut visited, &mut path, &mut cycles);
            }
        }
        cycles
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubecore_cluster::MockClusterClient;
    use kubecore_core::ResourceKind;
    use serde_json::json;

    fn resolver_with(client: MockClusterClient) -> ResourceResolver {
        ResourceResolver::new(Arc::new(client), ForwardConfig::default())
    }

    fn env_ref(name: &str) -> ResourceRef {
        ResourceRef::new(
            "platform.kubecore.io/v1alpha1",
            ResourceKind::XKubEnv,
            name,
            Some("test".to_string()),
        )
    }

    #[tokio::test]
    async fn resolves_and_extracts_edges() {
        let client = MockClusterClient::new();
        client.insert(json!({
            "apiVersion": "platform.kubecore.io/v1alpha1",
            "kind": "XKubEnv",
            "metadata": {"name": "demo-dev", "namespace": "test"},
            "spec": {
                "environmentType": "dev",
                "kubeClusterRef": {"name": "demo-cluster"}
            }
        }));
        let resolver = resolver_with(client);

        let mut context = ResolutionContext::default();
        let resolved = resolver
            .resolve_resource(&env_ref("demo-dev"), &mut context)
            .await
            .unwrap();

        assert_eq!(resolved.edges.len(), 1);
        assert_eq!(resolved.edges[0].kind, ResourceKind::XKubeCluster);
        assert_eq!(resolved.edges[0].namespace.as_deref(), Some("test"));
        assert!(!resolved.cached);
    }

    #[tokio::test]
    async fn second_resolution_is_served_from_cache() {
        let client = MockClusterClient::new();
        client.insert(json!({
            "apiVersion": "platform.kubecore.io/v1alpha1",
            "kind": "XKubEnv",
            "metadata": {"name": "demo-dev", "namespace": "test"},
            "spec": {}
        }));
        let resolver = resolver_with(client);

        let mut first = ResolutionContext::default();
        let initial = resolver
            .resolve_resource(&env_ref("demo-dev"), &mut first)
            .await
            .unwrap();
        assert!(!initial.cached);

        let mut second = ResolutionContext::default();
        let repeat = resolver
            .resolve_resource(&env_ref("demo-dev"), &mut second)
            .await
            .unwrap();
        assert!(repeat.cached);
    }

    #[tokio::test]
    async fn revisiting_an_active_ref_is_a_circular_dependency() {
        let client = MockClusterClient::new();
        let resolver = resolver_with(client);

        let reference = env_ref("demo-dev");
        let mut context = ResolutionContext::default();
        context.visited.insert(reference.clone());
        context.path.push(reference.clone());

        let error = resolver
            .resolve_resource(&reference, &mut context)
            .await
            .unwrap_err();
        assert!(matches!(error, KubeCoreError::CircularDependency(_)));
    }

    #[tokio::test]
    async fn depth_and_count_budgets_abort_the_walk() {
        let client = MockClusterClient::new();
        let resolver = resolver_with(client);

        let mut depth_limited = ResolutionContext::new(0, 100);
        let error = resolver
            .resolve_resource(&env_ref("a"), &mut depth_limited)
            .await
            .unwrap_err();
        assert!(matches!(error, KubeCoreError::ResolutionLimit(_)));

        let mut count_limited = ResolutionContext::new(5, 0);
        let error = resolver
            .resolve_resource(&env_ref("b"), &mut count_limited)
            .await
            .unwrap_err();
        assert!(matches!(error, KubeCoreError::ResolutionLimit(_)));
    }

    #[tokio::test]
    async fn bfs_follows_declared_relations_and_survives_missing_targets() {
        let client = MockClusterClient::new();
        client.insert(json!({
            "apiVersion": "platform.kubecore.io/v1alpha1",
            "kind": "XKubEnv",
            "metadata": {"name": "demo-dev", "namespace": "test"},
            "spec": {
                // Cluster exists, quality gate does not.
                "kubeClusterRef": {"name": "demo-cluster", "namespace": "test"},
                "gateRef": {
                    "name": "missing-gate",
                    "apiVersion": "platform.kubecore.io/v1alpha1",
                    "kind": "XQualityGate"
                }
            }
        }));
        client.insert(json!({
            "apiVersion": "platform.kubecore.io/v1alpha1",
            "kind": "XKubeCluster",
            "metadata": {"name": "demo-cluster", "namespace": "test"},
            "spec": {"region": "eu-west-1"}
        }));
        let resolver = resolver_with(client);

        let resolved = resolver
            .resolve_with_relationships(&env_ref("demo-dev"), 3, 50, None)
            .await;

        assert_eq!(resolved.len(), 2, "seed plus reachable cluster");
        assert!(resolved.keys().any(|r| r.kind == ResourceKind::XKubeCluster));
    }

    #[tokio::test]
    async fn parallel_resolution_reports_per_input_outcomes() {
        let client = MockClusterClient::new();
        client.insert(json!({
            "apiVersion": "platform.kubecore.io/v1alpha1",
            "kind": "XKubEnv",
            "metadata": {"name": "demo-dev", "namespace": "test"},
            "spec": {}
        }));
        let resolver = resolver_with(client);

        let refs = vec![env_ref("demo-dev"), env_ref("absent")];
        let results = resolver.resolve_parallel(&refs).await;

        assert!(results[&refs[0]].is_ok());
        assert!(matches!(
            results[&refs[1]],
            Err(KubeCoreError::NotFound(_))
        ));
    }

    #[test]
    fn detect_cycles_reports_loops() {
        let a = env_ref("a");
        let b = env_ref("b");
        let mut body_a = ResolvedResource::new(a.clone(), json!({}));
        body_a.edges = vec![b.clone()];
        let mut body_b = ResolvedResource::new(b.clone(), json!({}));
        body_b.edges = vec![a.clone()];

        let resolved = HashMap::from([(a.clone(), body_a), (b, body_b)]);
        let cycles = ResourceResolver::detect_cycles(&resolved);
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].len() >= 3);
    }
}
