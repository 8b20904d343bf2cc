pub mod context;
pub mod function;
pub mod input;
pub mod insights;
pub mod output;
pub mod query;

pub use context::{
    DirectRelationship, Insights, PlatformContext, Recommendation, Relationships, Requestor,
    SchemaBlock, SchemaInstance, SchemaMetadata, SuggestedReference, ValidationRule,
};
pub use function::{
    ContextFunction, FunctionRequest, FunctionResponse, Severity, PLATFORM_CONTEXT_KEY,
};
pub use input::{extract_context, parse_query, Query, RequestContext};
pub use insights::InsightsEngine;
pub use output::{build_output, validate_output, OUTPUT_API_VERSION, OUTPUT_KIND};
pub use query::QueryProcessor;
