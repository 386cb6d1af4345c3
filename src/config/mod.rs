use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub storage: StorageConfig,
    pub recommendation: RecommendationConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port))
    }

    /// Threads for the server runtime. Never zero.
    pub fn worker_threads(&self) -> usize {
        self.workers.max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub interest_backend: InterestBackend,
}

/// Tunables for tracking, profiling, similarity and generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub similar_default_limit: usize,
    pub similar_max_limit: usize,
    /// Upper bound on items pulled as a scoring universe.
    pub candidate_pool_size: usize,
    /// Number of most recent actions folded into an interest profile.
    pub behavior_window: usize,
    pub interest_threshold: f64,
    pub decay_half_life_days: f64,
    /// A stored batch older than this is regenerated on read.
    pub freshness_hours: i64,
    pub expiry_days: i64,
    pub min_score: f64,
    pub min_similarity: f64,
    pub trending_window_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub user_batch_limit: usize,
    pub similarity_pool_size: usize,
    pub concurrency: usize,
    pub behavior_retention_days: i64,
    pub similarity_retention_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: num_cpus::get(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            ttl_seconds: 3600,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            interest_backend: InterestBackend::Memory,
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
            similar_default_limit: 5,
            similar_max_limit: 20,
            candidate_pool_size: 1000,
            behavior_window: 100,
            interest_threshold: 0.01,
            decay_half_life_days: 30.0,
            freshness_hours: 24,
            expiry_days: 7,
            min_score: 0.1,
            min_similarity: 0.1,
            trending_window_days: 7,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            user_batch_limit: 1000,
            similarity_pool_size: 500,
            concurrency: num_cpus::get(),
            behavior_retention_days: 90,
            similarity_retention_days: 30,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("QUILLREC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_cadence() {
        let config = Config::default();
        assert_eq!(config.worker.interval_secs, 3600);
        assert_eq!(config.recommendation.expiry_days, 7);
        assert_eq!(config.recommendation.freshness_hours, 24);
        assert_eq!(config.storage.interest_backend, InterestBackend::Memory);
    }

    #[test]
    fn socket_addr_falls_back_on_bad_host() {
        let server = ServerConfig {
            host: "not a host".to_string(),
            port: 9000,
            workers: 1,
        };
        assert_eq!(server.socket_addr().port(), 9000);
    }

    #[test]
    fn worker_threads_follow_config_and_stay_positive() {
        let mut server = ServerConfig {
            workers: 3,
            ..ServerConfig::default()
        };
        assert_eq!(server.worker_threads(), 3);

        server.workers = 0;
        assert_eq!(server.worker_threads(), 1);
        assert!(ServerConfig::default().worker_threads() >= 1);
    }
}
