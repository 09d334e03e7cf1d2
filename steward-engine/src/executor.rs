//! Action execution against the cluster API.
//!
//! Every planned action becomes a recorded [`Action`] row and runs with
//! bounded retries and exponential backoff. Stops are idempotent: an
//! already-gone instance counts as success.

use std::sync::Arc;
use std::time::Duration;

use steward_cluster::{ClusterApi, ClusterError};
use tracing::{debug, error, warn};

use crate::action::{Action, ActionKind, ActionStatus};
use crate::error::Result;
use crate::reconciler::PlannedAction;
use crate::store::DeploymentStore;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

#[derive(Clone)]
pub struct ActionExecutor {
    cluster: Arc<dyn ClusterApi>,
    store: DeploymentStore,
    retry: RetryPolicy,
}

impl ActionExecutor {
    pub fn new(cluster: Arc<dyn ClusterApi>, store: DeploymentStore) -> Self {
        Self {
            cluster,
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Record and run one action to completion, retrying transient
    /// failures. Returns the settled action row.
    pub async fn execute(&self, planned: PlannedAction) -> Result<Action> {
        let (app, kind, image, instance_id) = match planned {
            PlannedAction::Start { app, image } => (app, ActionKind::Start, Some(image), None),
            PlannedAction::Stop { app, instance_id } => {
                (app, ActionKind::Stop, None, Some(instance_id))
            }
        };

        let action = self
            .store
            .record_action(&app, kind, image.as_deref(), instance_id.as_deref())
            .await?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.store.set_action_running(&action.id, attempt).await?;

            match self.perform(kind, &app, image.as_deref(), instance_id.as_deref()).await {
                Ok(()) => {
                    self.store
                        .finish_action(&action.id, ActionStatus::Succeeded, None)
                        .await?;
                    debug!(%app, ?kind, attempt, "Cluster action succeeded");
                    return self.store.get_action(&action.id).await;
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        %app,
                        ?kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Cluster action failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(%app, ?kind, attempt, "Cluster action failed permanently: {}", e);
                    self.store
                        .finish_action(&action.id, ActionStatus::Failed, Some(&e.to_string()))
                        .await?;
                    return self.store.get_action(&action.id).await;
                }
            }
        }
    }

    async fn perform(
        &self,
        kind: ActionKind,
        app: &str,
        image: Option<&str>,
        instance_id: Option<&str>,
    ) -> std::result::Result<(), ClusterError> {
        match kind {
            ActionKind::Start => {
                let image = image.unwrap_or_default();
                self.cluster.start_instance(app, image).await?;
                Ok(())
            }
            ActionKind::Stop => {
                let id = instance_id.unwrap_or_default();
                match self.cluster.stop_instance(id).await {
                    // Already gone; the point of the stop is achieved.
                    Err(ClusterError::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry
            .base_delay
            .saturating_mul(factor)
            .min(self.retry.max_delay)
    }
}
