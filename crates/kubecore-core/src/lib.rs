pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod types;

pub use config::{CacheSettings, ResolverConfig, TransitiveSettings};
pub use error::{KubeCoreError, Result};
pub use registry::{ResourceSchema, SchemaRegistry};
pub use types::{
    Cardinality, DiscoveryMethod, RelationType, ResolvedResource, ResourceKind, ResourceRef,
};
