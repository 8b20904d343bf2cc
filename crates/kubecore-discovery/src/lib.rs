pub mod executor;
pub mod extract;
pub mod resolver;
pub mod reverse;
pub mod summarizer;
pub mod transitive;

pub use executor::{ParallelExecutor, PerformanceMetrics};
pub use extract::{extract_edges, infer_kind_from_field, parse_object_reference};
pub use resolver::{ForwardConfig, ResolutionContext, ResourceResolver};
pub use reverse::{matches_reference, ReverseConfig, ReverseDiscovery};
pub use summarizer::{infer_relation, ResourceSummarizer, ResourceSummary, SummarizerConfig};
pub use transitive::{EngineHealth, TransitiveEngine, TransitiveHit};
