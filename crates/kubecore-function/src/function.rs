//! Transport-neutral entry point: one request/response operation over
//! JSON documents. The host RPC runtime owns delivery and deadlines.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kubecore_cache::ContextCache;
use kubecore_cluster::ClusterClient;
use kubecore_core::{ResolverConfig, SchemaRegistry};
use kubecore_discovery::{
    ForwardConfig, ParallelExecutor, ResourceResolver, ResourceSummarizer, ReverseConfig,
    ReverseDiscovery, SummarizerConfig, TransitiveEngine,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::input;
use crate::output;
use crate::query::QueryProcessor;

/// Context-map key the platform context is written under.
pub const PLATFORM_CONTEXT_KEY: &str = "context.fn.kubecore.io/platform-context";

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionRequest {
    /// Caller-provided tag, used only for logging.
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub input: Value,
    /// The observed composite resource.
    #[serde(default)]
    pub observed: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Fatal,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    pub severity: Severity,
    pub message: String,
    pub context: BTreeMap<String, Value>,
}

impl FunctionResponse {
    fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }
}

/// The composed resolver: registry, fetcher-backed engines, caches and
/// the query processor, wired from one configuration.
pub struct ContextFunction {
    processor: QueryProcessor,
    config: ResolverConfig,
}

impl ContextFunction {
    pub fn new(client: Arc<dyn ClusterClient>, config: ResolverConfig) -> Self {
        let registry = SchemaRegistry::new();
        let resolver = Arc::new(ResourceResolver::new(
            client.clone(),
            ForwardConfig::default(),
        ));
        let summarizer = Arc::new(ResourceSummarizer::new(
            registry.clone(),
            SummarizerConfig::default(),
        ));
        let reverse = Arc::new(ReverseDiscovery::new(
            client.clone(),
            ReverseConfig::default(),
        ));
        let transitive = Arc::new(TransitiveEngine::new(client, config.transitive.clone()));
        let cache = Arc::new(ContextCache::new(
            Duration::from_secs(config.cache.ttl_seconds),
            config.cache.max_entries,
        ));
        let executor = Arc::new(ParallelExecutor::new(
            config.max_workers,
            config.batch_timeout(),
        ));

        let processor = QueryProcessor::new(
            registry,
            resolver,
            summarizer,
            reverse,
            transitive,
            Some(cache),
            Some(executor),
        );
        Self { processor, config }
    }

    pub fn from_env(client: Arc<dyn ClusterClient>) -> Self {
        Self::new(client, ResolverConfig::from_env())
    }

    pub fn processor(&self) -> &QueryProcessor {
        &self.processor
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Run one request. Partial discovery failures still produce a
    /// `normal` response with reduced content; only invalid input or an
    /// invalid output document is fatal.
    pub async fn run(&self, request: &FunctionRequest) -> FunctionResponse {
        info!(tag = %request.tag, "kubecore-context.start");

        let query = match input::parse_query(&request.input) {
            Ok(query) => query,
            Err(e) => {
                error!(tag = %request.tag, error = %e, "invalid query");
                return FunctionResponse::fatal(format!("KubeCore context resolution failed: {}", e));
            }
        };

        let context = input::extract_context(
            &request.input,
            &request.observed,
            self.config.transitive.max_depth,
        );

        let requestor_kind = query
            .resource_type
            .parse()
            .unwrap_or(kubecore_core::ResourceKind::Other(
                query.resource_type.clone(),
            ));

        let platform = match self.processor.process(&query, &context).await {
            Ok(platform) => platform,
            Err(e) => {
                error!(tag = %request.tag, error = %e, "query processing failed");
                return FunctionResponse::fatal(format!("KubeCore context resolution failed: {}", e));
            }
        };

        let document = match output::build_output(&platform, &requestor_kind) {
            Ok(document) => document,
            Err(e) => {
                return FunctionResponse::fatal(format!("response serialization failed: {}", e));
            }
        };

        if let Err(e) = output::validate_output(&document) {
            error!(tag = %request.tag, error = %e, "output failed structural validation");
            return FunctionResponse::fatal(format!("invalid platform context: {}", e));
        }

        info!(tag = %request.tag, "kubecore-context.complete");
        FunctionResponse {
            severity: Severity::Normal,
            message: "KubeCore context resolution completed successfully".to_string(),
            context: BTreeMap::from([(PLATFORM_CONTEXT_KEY.to_string(), document)]),
        }
    }
}

impl Severity {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Severity::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubecore_cluster::MockClusterClient;
    use serde_json::json;

    #[tokio::test]
    async fn missing_resource_type_is_fatal() {
        let function = ContextFunction::new(
            Arc::new(MockClusterClient::new()),
            ResolverConfig::default(),
        );
        let request = FunctionRequest {
            tag: "t".to_string(),
            input: json!({"spec": {"query": {}}}),
            observed: json!({}),
        };
        let response = function.run(&request).await;
        assert_eq!(response.severity, Severity::Fatal);
        assert!(response.context.is_empty());
    }

    #[tokio::test]
    async fn unknown_requestor_yields_valid_empty_context() {
        let function = ContextFunction::new(
            Arc::new(MockClusterClient::new()),
            ResolverConfig::default(),
        );
        let request = FunctionRequest {
            tag: "t".to_string(),
            input: json!({"spec": {"query": {"resourceType": "Mystery"}}}),
            observed: json!({"kind": "Mystery", "metadata": {"name": "m", "namespace": "ns"}}),
        };
        let response = function.run(&request).await;
        assert_eq!(response.severity, Severity::Normal);

        let document = &response.context[PLATFORM_CONTEXT_KEY];
        let platform = &document["spec"]["platformContext"];
        assert_eq!(platform["availableSchemas"], json!({}));
        assert_eq!(platform["relationships"]["direct"], json!([]));
    }
}
