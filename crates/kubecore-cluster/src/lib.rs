pub mod breaker;
pub mod client;
pub mod mock;
pub mod plural;

pub use breaker::{BreakerRegistry, BreakerState, CircuitBreaker};
pub use client::{
    ClusterClient, ClusterCredentials, FetcherConfig, HttpClusterClient, ListParams, ListResult,
};
pub use mock::{InjectedFailure, MockClusterClient};
pub use plural::plural_form;
