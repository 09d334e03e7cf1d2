//! Cluster backend abstraction for Steward.
//!
//! The orchestrator never talks to a cluster directly; it goes through the
//! [`ClusterApi`] trait defined here. The production backend is an HTTP
//! client against a cluster agent, and a controllable in-memory mock is
//! available behind the `test-helpers` feature.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod http;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use error::{ClusterError, Result};
pub use http::HttpCluster;

/// One running (or transitioning) instance of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub app: String,
    pub image: String,
    pub state: InstanceState,
    pub health: HealthState,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

impl Instance {
    /// Whether the instance counts toward a running set. Instances on the
    /// way out are excluded so scaling math doesn't see them twice.
    pub fn is_active(&self) -> bool {
        self.state != InstanceState::Stopping
    }
}

/// The contract every cluster backend implements.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Backend name, e.g. "http" or "mock".
    fn name(&self) -> &'static str;

    /// List every instance the cluster knows about, across all apps.
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Start one instance of `app` running `image`.
    async fn start_instance(&self, app: &str, image: &str) -> Result<Instance>;

    /// Stop the instance with the given id.
    async fn stop_instance(&self, id: &str) -> Result<()>;
}

/// Backend selection, usually filled from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Backend kind: "http" or (with `test-helpers`) "mock".
    pub backend: String,
    /// Base URL of the cluster agent, required for the "http" backend.
    pub base_url: Option<String>,
    /// Bearer token sent on every agent request, if set.
    pub token: Option<String>,
}

/// Instantiate the configured cluster backend.
pub fn get_cluster(config: &ClusterConfig) -> Result<Arc<dyn ClusterApi>> {
    match config.backend.as_str() {
        "http" => {
            let base_url = config.base_url.clone().ok_or_else(|| {
                ClusterError::Config("http backend requires a base URL".to_string())
            })?;
            Ok(Arc::new(HttpCluster::new(base_url, config.token.clone())))
        }
        #[cfg(feature = "test-helpers")]
        "mock" => Ok(Arc::new(mock::MockCluster::new())),
        other => Err(ClusterError::Config(format!(
            "Unknown cluster backend '{}'",
            other
        ))),
    }
}
