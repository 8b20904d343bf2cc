//! The query orchestrator: composes forward, reverse and transitive
//! discovery into one typed platform context, with response caching.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use kubecore_cache::{ContextCache, DiscoveryMode, QueryFingerprint, TargetRef};
use kubecore_core::{
    model, Cardinality, DiscoveryMethod, KubeCoreError, RelationType, ResourceKind, ResourceRef,
    Result, SchemaRegistry,
};
use kubecore_discovery::{
    ParallelExecutor, ResolutionContext, ResourceResolver, ResourceSummarizer, ReverseDiscovery,
    TransitiveEngine, TransitiveHit,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::context::{
    DirectRelationship, PlatformContext, SchemaBlock, SchemaInstance, SchemaMetadata,
};
use crate::input::{Query, RequestContext};
use crate::insights::InsightsEngine;

pub struct QueryProcessor {
    registry: SchemaRegistry,
    resolver: Arc<ResourceResolver>,
    summarizer: Arc<ResourceSummarizer>,
    reverse: Arc<ReverseDiscovery>,
    transitive: Arc<TransitiveEngine>,
    insights: InsightsEngine,
    cache: Option<Arc<ContextCache>>,
    executor: Option<Arc<ParallelExecutor>>,
}

impl QueryProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: SchemaRegistry,
        resolver: Arc<ResourceResolver>,
        summarizer: Arc<ResourceSummarizer>,
        reverse: Arc<ReverseDiscovery>,
        transitive: Arc<TransitiveEngine>,
        cache: Option<Arc<ContextCache>>,
        executor: Option<Arc<ParallelExecutor>>,
    ) -> Self {
        Self {
            registry,
            resolver,
            summarizer,
            reverse,
            transitive,
            insights: InsightsEngine::new(),
            cache,
            executor,
        }
    }

    pub fn transitive_engine(&self) -> &TransitiveEngine {
        &self.transitive
    }

    pub fn cache(&self) -> Option<&ContextCache> {
        self.cache.as_deref()
    }

    /// Process one query into a platform context. Per-ref and per-kind
    /// failures reduce content but never fail the query.
    pub async fn process(&self, query: &Query, context: &RequestContext) -> Result<PlatformContext> {
        let started = Instant::now();
        let kind: ResourceKind = query
            .resource_type
            .parse()
            .unwrap_or_else(|_| ResourceKind::Other(query.resource_type.clone()));

        info!(resource_type = %kind, "processing query");

        let cache_key = self.fingerprint(query, context, &kind).digest();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&cache_key) {
                if let Some(executor) = &self.executor {
                    executor.record_cache_access(true);
                }
                match serde_json::from_value::<PlatformContext>(hit) {
                    Ok(cached) => {
                        debug!(key = %cache_key, "serving query from response cache");
                        return Ok(cached);
                    }
                    Err(e) => warn!(error = %e, "cached context is unreadable, recomputing"),
                }
            } else if let Some(executor) = &self.executor {
                executor.record_cache_access(false);
            }
        }

        let mut platform = PlatformContext::new(
            kind.to_string(),
            context.requestor_name.clone(),
            context.requestor_namespace.clone(),
        );

        self.process_forward(query, context, &kind, &mut platform).await;

        if model::is_hub_kind(&kind) {
            self.process_reverse(context, &kind, &mut platform).await;
        }

        if context.enable_transitive && context.transitive_max_depth > 0 {
            self.process_transitive(context, &kind, &mut platform).await;
        }

        for block in platform.available_schemas.values_mut() {
            block.dedup_and_sort();
        }

        self.attach_relationships(&kind, &mut platform);
        platform.insights = self.insights.generate(&platform, &kind);

        if let Some(cache) = &self.cache {
            match serde_json::to_value(&platform) {
                Ok(value) => cache.put(cache_key, value),
                Err(e) => warn!(error = %e, "failed to serialize context for caching"),
            }
        }
        if let Some(executor) = &self.executor {
            executor.record_query(started.elapsed());
        }

        info!(
            resource_type = %kind,
            schemas = platform.available_schemas.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "query processing completed"
        );
        Ok(platform)
    }

    fn fingerprint(
        &self,
        query: &Query,
        context: &RequestContext,
        kind: &ResourceKind,
    ) -> QueryFingerprint {
        let reverse_active = model::is_hub_kind(kind);
        QueryFingerprint {
            resource_type: kind.clone(),
            mode: if reverse_active {
                DiscoveryMode::Bidirectional
            } else {
                DiscoveryMode::Forward
            },
            transitive_enabled: context.enable_transitive,
            transitive_max_depth: context.transitive_max_depth,
            target_ref: reverse_active.then(|| TargetRef {
                kind: kind.clone(),
                name: context.requestor_name.clone(),
                namespace: Some(context.requestor_namespace.clone()),
            }),
            requested_schemas: query.requested_schemas.clone(),
            references: context
                .references
                .iter()
                .map(|(key, refs)| (key.clone(), Value::Array(refs.clone())))
                .collect::<BTreeMap<String, Value>>(),
        }
    }

    async fn process_forward(
        &self,
        query: &Query,
        context: &RequestContext,
        kind: &ResourceKind,
        platform: &mut PlatformContext,
    ) {
        let accessible = self.registry.accessible_kinds(kind);
        let targets: Vec<(String, ResourceKind)> = query
            .requested_schemas
            .iter()
            .filter_map(|name| {
                let target = self.registry.map_requested_name(name)?;
                if accessible.contains(&target) {
                    Some((name.clone(), target))
                } else {
                    debug!(schema = %name, requestor = %kind, "schema not accessible, dropping");
                    None
                }
            })
            .collect();

        if targets.is_empty() {
            return;
        }

        if let Some(executor) = &self.executor {
            if targets.len() > 1 {
                let tasks = targets
                    .iter()
                    .map(|(name, target)| {
                        self.build_forward_block(
                            name.clone(),
                            target.clone(),
                            kind.clone(),
                            context,
                            query.include_full_schemas,
                        )
                        .map(Ok::<_, KubeCoreError>)
                        .boxed()
                    })
                    .collect();
                match executor.run_batch(tasks).await {
                    Ok(results) => {
                        for result in results.into_iter().flatten() {
                            if let Some((name, block)) = result {
                                platform.available_schemas.insert(name, block);
                            }
                        }
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "parallel schema processing failed, falling back to sequential");
                    }
                }
            }
        }

        for (name, target) in targets {
            if platform.available_schemas.contains_key(&name) {
                continue;
            }
            if let Some((name, block)) = self
                .build_forward_block(
                    name,
                    target,
                    kind.clone(),
                    context,
                    query.include_full_schemas,
                )
                .await
            {
                platform.available_schemas.insert(name, block);
            }
        }
    }

    async fn build_forward_block(
        &self,
        short_name: String,
        target: ResourceKind,
        requestor_kind: ResourceKind,
        context: &RequestContext,
        include_full_schema: bool,
    ) -> Option<(String, SchemaBlock)> {
        let schema = self.registry.get_schema(&target)?;
        let ref_key = model::ref_list_key(&target);
        let refs = context.references.get(ref_key).cloned().unwrap_or_default();

        let mut instances = Vec::with_capacity(refs.len());
        for ref_value in &refs {
            let Some(name) = ref_value.get("name").and_then(Value::as_str) else {
                continue;
            };
            let namespace = ref_value
                .get("namespace")
                .and_then(Value::as_str)
                .unwrap_or(&context.requestor_namespace)
                .to_string();
            let api_version = ref_value
                .get("apiVersion")
                .and_then(Value::as_str)
                .unwrap_or_else(|| model::api_version(&target));

            let reference = ResourceRef::new(
                api_version,
                target.clone(),
                name,
                Some(namespace.clone()),
            );
            let summary = match self
                .resolver
                .resolve_resource(&reference, &mut ResolutionContext::default())
                .await
            {
                Ok(resolved) => self.summarizer.summarize(&resolved, None).summary,
                Err(e) => {
                    warn!(reference = %reference, error = %e, "reference did not resolve");
                    json!({"name": name, "status": "unresolved"})
                }
            };

            instances.push(SchemaInstance {
                name: name.to_string(),
                namespace,
                summary,
            });
        }

        let mut relationship_path = self.registry.relationship_path(&requestor_kind, &target);
        if relationship_path.is_empty() {
            relationship_path = vec![
                model::short_name(&requestor_kind).to_string(),
                short_name.clone(),
            ];
        }

        let block = SchemaBlock {
            metadata: SchemaMetadata {
                api_version: schema.api_version.to_string(),
                kind: target.to_string(),
                accessible: true,
                relationship_path,
                discovery_method: Some(DiscoveryMethod::Direct),
            },
            instances,
            schema: include_full_schema.then(|| schema.projection.clone()),
        };
        Some((short_name, block))
    }

    async fn process_reverse(
        &self,
        context: &RequestContext,
        kind: &ResourceKind,
        platform: &mut PlatformContext,
    ) {
        let discovered = self
            .reverse
            .discover(
                kind,
                &context.requestor_name,
                Some(&context.requestor_namespace),
            )
            .await;

        for (ref_key, refs) in discovered {
            let short_name = ref_key.trim_end_matches("Refs").to_string();
            let Some(target) = self.registry.map_requested_name(&short_name) else {
                warn!(key = %ref_key, "reverse discovery produced unknown schema key");
                continue;
            };
            let Some(schema) = self.registry.get_schema(&target) else {
                continue;
            };

            let instances: Vec<SchemaInstance> = refs
                .iter()
                .map(|reference| SchemaInstance {
                    name: reference.name.clone(),
                    namespace: reference
                        .namespace
                        .clone()
                        .unwrap_or_else(|| "default".to_string()),
                    summary: json!({
                        "name": reference.name,
                        "kind": reference.kind.to_string(),
                        "status": "discovered",
                        "discoveredBy": "reverse-lookup",
                    }),
                })
                .collect();

            match platform.available_schemas.get_mut(&short_name) {
                Some(block) => {
                    for instance in instances {
                        if !block.contains_instance(&instance.name, &instance.namespace) {
                            block.instances.push(instance);
                        }
                    }
                }
                None => {
                    platform.available_schemas.insert(
                        short_name.clone(),
                        SchemaBlock {
                            metadata: SchemaMetadata {
                                api_version: schema.api_version.to_string(),
                                kind: target.to_string(),
                                accessible: true,
                                relationship_path: vec![
                                    "reverse".to_string(),
                                    short_name.clone(),
                                ],
                                discovery_method: Some(DiscoveryMethod::Reverse),
                            },
                            instances,
                            schema: None,
                        },
                    );
                }
            }
        }
    }

    async fn process_transitive(
        &self,
        context: &RequestContext,
        kind: &ResourceKind,
        platform: &mut PlatformContext,
    ) {
        let source = ResourceRef::new(
            model::api_version(kind),
            kind.clone(),
            context.requestor_name.clone(),
            Some(context.requestor_namespace.clone()),
        );

        let discovered = self
            .transitive
            .discover(&source, Some(context.transitive_max_depth))
            .await;

        for (target, hits) in discovered {
            let short_name = model::short_name(&target).to_string();
            let Some(schema) = self.registry.get_schema(&target) else {
                continue;
            };
            let instances: Vec<SchemaInstance> =
                hits.iter().map(transitive_instance).collect();

            match platform.available_schemas.get_mut(&short_name) {
                Some(block) => {
                    let mut merged = false;
                    for instance in instances {
                        if !block.contains_instance(&instance.name, &instance.namespace) {
                            block.instances.push(instance);
                            merged = true;
                        }
                    }
                    if merged {
                        block.metadata.discovery_method = Some(DiscoveryMethod::Hybrid);
                    }
                }
                None => {
                    platform.available_schemas.insert(
                        short_name.clone(),
                        SchemaBlock {
                            metadata: SchemaMetadata {
                                api_version: schema.api_version.to_string(),
                                kind: target.to_string(),
                                accessible: true,
                                relationship_path: vec![
                                    "transitive".to_string(),
                                    short_name.clone(),
                                ],
                                discovery_method: Some(DiscoveryMethod::Transitive),
                            },
                            instances,
                            schema: None,
                        },
                    );
                }
            }
        }
    }

    fn attach_relationships(&self, kind: &ResourceKind, platform: &mut PlatformContext) {
        for (relation, targets) in model::outbound_edges(kind) {
            for target in *targets {
                platform.relationships.direct.push(DirectRelationship {
                    target: model::short_name(target).to_string(),
                    cardinality: cardinality_for(kind, target, *relation),
                    description: format!(
                        "{} {} {}",
                        model::short_name(kind),
                        relation,
                        model::short_name(target)
                    ),
                });
            }
        }
    }
}

fn cardinality_for(from: &ResourceKind, to: &ResourceKind, relation: RelationType) -> Cardinality {
    model::cardinality(from, to)
        .or_else(|| model::cardinality(to, from))
        .unwrap_or(match relation {
            RelationType::BelongsTo | RelationType::SourcedBy | RelationType::RunsOn => {
                Cardinality::OneToOne
            }
            _ => Cardinality::OneToMany,
        })
}

fn transitive_instance(hit: &TransitiveHit) -> SchemaInstance {
    let mut summary = hit.summary.clone();
    if let Some(map) = summary.as_object_mut() {
        map.insert("discoveryHops".to_string(), json!(hit.hops));
        map.insert("discoveryMethod".to_string(), json!(hit.method));
        map.insert(
            "relationshipChain".to_string(),
            json!(hit.relationship_chain()),
        );
        let intermediates = hit.intermediates();
        if !intermediates.is_empty() {
            map.insert(
                "intermediateResources".to_string(),
                Value::Array(
                    intermediates
                        .iter()
                        .map(|reference| {
                            json!({
                                "kind": reference.kind.to_string(),
                                "name": reference.name,
                                "namespace": reference.namespace,
                            })
                        })
                        .collect(),
                ),
            );
        }
    }

    SchemaInstance {
        name: hit.reference.name.clone(),
        namespace: hit
            .reference
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        summary,
    }
}
