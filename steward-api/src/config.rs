use serde::Deserialize;
use std::path::PathBuf;
use steward_cluster::ClusterConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_observe_interval")]
    pub observe_interval_secs: u64,

    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    #[serde(default = "default_cluster_backend")]
    pub cluster_backend: String,

    #[serde(default = "default_cluster_url")]
    pub cluster_url: Option<String>,

    #[serde(default = "default_cluster_token")]
    pub cluster_token: Option<String>,
}

fn default_bind_addr() -> String {
    std::env::var("STEWARD_API_BIND").unwrap_or_else(|_| "0.0.0.0:7070".to_string())
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("STEWARD_DB_PATH") {
        return PathBuf::from(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".steward").join("steward.db")
}

fn default_observe_interval() -> u64 {
    std::env::var("STEWARD_OBSERVE_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
}

fn default_reconcile_interval() -> u64 {
    std::env::var("STEWARD_RECONCILE_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(15)
}

fn default_cluster_backend() -> String {
    std::env::var("STEWARD_CLUSTER_BACKEND").unwrap_or_else(|_| "http".to_string())
}

fn default_cluster_url() -> Option<String> {
    std::env::var("STEWARD_CLUSTER_URL").ok()
}

fn default_cluster_token() -> Option<String> {
    std::env::var("STEWARD_CLUSTER_TOKEN").ok()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            observe_interval_secs: default_observe_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
            cluster_backend: default_cluster_backend(),
            cluster_url: default_cluster_url(),
            cluster_token: default_cluster_token(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            backend: self.cluster_backend.clone(),
            base_url: self.cluster_url.clone(),
            token: self.cluster_token.clone(),
        }
    }
}
