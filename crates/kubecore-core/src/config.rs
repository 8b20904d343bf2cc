use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Response-cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_entries: 1000,
        }
    }
}

/// Settings for the multi-hop transitive discovery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitiveSettings {
    pub max_depth: usize,
    pub max_resources_per_type: usize,
    pub timeout_per_depth_secs: f64,
    pub parallel_workers: usize,
    pub cache_intermediate_results: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown_secs: u64,
    pub memory_limit_mb: usize,
    pub early_termination_enabled: bool,
}

impl Default for TransitiveSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_resources_per_type: 50,
            timeout_per_depth_secs: 10.0,
            parallel_workers: 5,
            cache_intermediate_results: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown_secs: 60,
            memory_limit_mb: 200,
            early_termination_enabled: true,
        }
    }
}

impl TransitiveSettings {
    pub fn timeout_per_depth(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_per_depth_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_cooldown_secs)
    }
}

/// Top-level resolver configuration, populated from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub cache: CacheSettings,
    pub max_workers: usize,
    pub timeout_seconds: f64,
    pub transitive: TransitiveSettings,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            max_workers: 4,
            timeout_seconds: 30.0,
            transitive: TransitiveSettings::default(),
        }
    }
}

impl ResolverConfig {
    /// Read configuration from the process environment. Unset or
    /// unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache: CacheSettings {
                ttl_seconds: env_or("CACHE_TTL_SECONDS", defaults.cache.ttl_seconds),
                max_entries: env_or("CACHE_MAX_ENTRIES", defaults.cache.max_entries),
            },
            max_workers: env_or("MAX_WORKERS", defaults.max_workers),
            timeout_seconds: env_or("TIMEOUT_SECONDS", defaults.timeout_seconds),
            transitive: TransitiveSettings {
                max_depth: env_or("TRANSITIVE_MAX_DEPTH", defaults.transitive.max_depth),
                max_resources_per_type: env_or(
                    "TRANSITIVE_MAX_RESOURCES",
                    defaults.transitive.max_resources_per_type,
                ),
                timeout_per_depth_secs: env_or(
                    "TRANSITIVE_TIMEOUT",
                    defaults.transitive.timeout_per_depth_secs,
                ),
                parallel_workers: env_or(
                    "TRANSITIVE_WORKERS",
                    defaults.transitive.parallel_workers,
                ),
                cache_intermediate_results: env_or(
                    "TRANSITIVE_CACHE",
                    defaults.transitive.cache_intermediate_results,
                ),
                ..defaults.transitive
            },
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var = key, value = %raw, "unparseable environment value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ResolverConfig::default();
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.transitive.max_depth, 3);
        assert_eq!(config.transitive.max_resources_per_type, 50);
        assert_eq!(config.transitive.parallel_workers, 5);
        assert!(config.transitive.cache_intermediate_results);
    }

    #[test]
    fn env_overrides_are_applied() {
        std::env::set_var("TRANSITIVE_MAX_DEPTH", "2");
        std::env::set_var("CACHE_TTL_SECONDS", "not-a-number");
        let config = ResolverConfig::from_env();
        assert_eq!(config.transitive.max_depth, 2);
        // Bad value falls back to the default.
        assert_eq!(config.cache.ttl_seconds, 300);
        std::env::remove_var("TRANSITIVE_MAX_DEPTH");
        std::env::remove_var("CACHE_TTL_SECONDS");
    }
}
