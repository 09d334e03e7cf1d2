//! The control loop.
//!
//! Each tick diffs desired state against the latest cluster snapshot and
//! decides what has to happen: scale, replace, begin or step a rollout.
//! Planning is pure ([`plan_app`]); the loop around it loads state, applies
//! transitions, and hands actions to the executor.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use steward_cluster::Instance;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::executor::ActionExecutor;
use crate::observer::{ClusterSnapshot, ObserverHandle};
use crate::rollout::{self, Rollout, RolloutPhase, RolloutTransition};
use crate::store::{Deployment, DeploymentFilters, DeploymentStore};

/// `applied_by` for writes the orchestrator makes on its own behalf.
pub const SYSTEM_USER: &str = "steward";

/// An instance-level operation the planner decided on.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    Start { app: String, image: String },
    Stop { app: String, instance_id: String },
}

/// Everything one planning pass decided for one app.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub actions: Vec<PlannedAction>,
    pub transitions: Vec<RolloutTransition>,
}

impl Plan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn actions(actions: Vec<PlannedAction>) -> Self {
        Self {
            actions,
            transitions: Vec::new(),
        }
    }

    pub fn transition(transition: RolloutTransition) -> Self {
        Self {
            actions: Vec::new(),
            transitions: vec![transition],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.transitions.is_empty()
    }
}

/// Decide what one app needs this tick. Pure: state in, plan out.
pub fn plan_app(
    deployment: &Deployment,
    active_rollout: Option<&Rollout>,
    observed: &[&Instance],
    unhealthy_streaks: &HashMap<String, u32>,
    now: DateTime<Utc>,
) -> Plan {
    if let Some(rollout) = active_rollout {
        if rollout.phase == RolloutPhase::RollingBack {
            return rollout::step_rollback(deployment, rollout, observed);
        }
        if rollout.to_image != deployment.image {
            return Plan::transition(RolloutTransition::Supersede {
                rollout_id: rollout.id.clone(),
                reason: format!("superseded by revision {}", deployment.revision),
            });
        }
        return rollout::step(deployment, rollout, observed, now);
    }

    let current: Vec<&Instance> = observed
        .iter()
        .copied()
        .filter(|i| i.image == deployment.image)
        .collect();
    let stale: Vec<&Instance> = observed
        .iter()
        .copied()
        .filter(|i| i.image != deployment.image)
        .collect();

    if deployment.replicas == 0 {
        // Scale to zero needs no gating; stop everything.
        let actions = observed
            .iter()
            .map(|i| PlannedAction::Stop {
                app: deployment.app.clone(),
                instance_id: i.id.clone(),
            })
            .collect();
        return Plan::actions(actions);
    }

    if !stale.is_empty() {
        return Plan::transition(RolloutTransition::Begin {
            from_image: majority_image(&stale),
            to_image: deployment.image.clone(),
        });
    }

    steady_state(deployment, &current, unhealthy_streaks)
}

/// The image most of the stale fleet runs; that's what a failed rollout
/// would restore.
fn majority_image(stale: &[&Instance]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for instance in stale {
        *counts.entry(instance.image.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(image, _)| image.to_string())
        .unwrap_or_default()
}

/// Scaling and replacement when desired and observed images already agree.
fn steady_state(
    deployment: &Deployment,
    current: &[&Instance],
    unhealthy_streaks: &HashMap<String, u32>,
) -> Plan {
    let desired = deployment.replicas as usize;
    let running = current.len();
    let app = &deployment.app;

    if running < desired {
        let actions = (running..desired)
            .map(|_| PlannedAction::Start {
                app: app.clone(),
                image: deployment.image.clone(),
            })
            .collect();
        return Plan::actions(actions);
    }

    if running > desired {
        // Shed unhealthy instances first, then the newest.
        let mut candidates = current.to_vec();
        candidates.sort_by(|a, b| {
            let streak_a = unhealthy_streaks.get(&a.id).copied().unwrap_or(0);
            let streak_b = unhealthy_streaks.get(&b.id).copied().unwrap_or(0);
            streak_b
                .cmp(&streak_a)
                .then(b.started_at.cmp(&a.started_at))
        });
        let actions = candidates
            .iter()
            .take(running - desired)
            .map(|i| PlannedAction::Stop {
                app: app.clone(),
                instance_id: i.id.clone(),
            })
            .collect();
        return Plan::actions(actions);
    }

    // At the right count: replace instances that have been unhealthy for
    // the health check's declared tolerance.
    let threshold = deployment.health_check.failure_threshold;
    let mut actions = Vec::new();
    for instance in current {
        let streak = unhealthy_streaks.get(&instance.id).copied().unwrap_or(0);
        if streak >= threshold {
            actions.push(PlannedAction::Stop {
                app: app.clone(),
                instance_id: instance.id.clone(),
            });
            actions.push(PlannedAction::Start {
                app: app.clone(),
                image: deployment.image.clone(),
            });
        }
    }

    Plan::actions(actions)
}

pub struct Reconciler {
    store: DeploymentStore,
    observer: ObserverHandle,
    executor: ActionExecutor,
    unhealthy_streaks: HashMap<String, u32>,
    max_snapshot_age: Duration,
}

impl Reconciler {
    pub fn new(store: DeploymentStore, observer: ObserverHandle, executor: ActionExecutor) -> Self {
        Self {
            store,
            observer,
            executor,
            unhealthy_streaks: HashMap::new(),
            max_snapshot_age: Duration::seconds(90),
        }
    }

    /// Oldest snapshot the loop will still act on.
    pub fn with_max_snapshot_age(mut self, age: Duration) -> Self {
        self.max_snapshot_age = age;
        self
    }

    /// The reconcile loop; ticks until the task is dropped.
    pub async fn run(mut self, tick_interval: time::Duration) {
        let mut ticker = time::interval(tick_interval);

        info!(
            "Reconciler running (ticks every {:?})",
            tick_interval
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.reconcile_tick().await {
                error!("Reconcile tick failed: {}", e);
            }
        }
    }

    pub async fn reconcile_tick(&mut self) -> Result<()> {
        self.reconcile_at(Utc::now()).await
    }

    /// One pass over every deployment. Takes `now` so tests can steer the
    /// rollout clock.
    pub async fn reconcile_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(snapshot) = self.observer.latest().await else {
            debug!("No cluster snapshot yet, skipping tick");
            return Ok(());
        };

        if now - snapshot.taken_at > self.max_snapshot_age {
            warn!(
                taken_at = %snapshot.taken_at,
                "Cluster snapshot is stale, skipping tick"
            );
            return Ok(());
        }

        self.update_streaks(&snapshot);

        let deployments = self.store.list(DeploymentFilters::default()).await?;

        let managed: HashSet<&str> = deployments.iter().map(|d| d.app.as_str()).collect();
        for app in snapshot.apps() {
            if !managed.contains(app) {
                warn!(app, "Observed instances for an app with no deployment");
            }
        }

        for deployment in &deployments {
            if deployment.paused {
                debug!(app = %deployment.app, "Deployment paused, skipping");
                continue;
            }

            if let Err(e) = self.reconcile_app(deployment, &snapshot, now).await {
                error!(app = %deployment.app, "Reconcile failed: {}", e);
            }
        }

        Ok(())
    }

    async fn reconcile_app(
        &self,
        deployment: &Deployment,
        snapshot: &ClusterSnapshot,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let pending = self.store.pending_actions(&deployment.app).await?;
        if !pending.is_empty() {
            debug!(
                app = %deployment.app,
                count = pending.len(),
                "Actions still in flight, holding"
            );
            return Ok(());
        }

        let observed: Vec<&Instance> = snapshot
            .app(&deployment.app)
            .into_iter()
            .filter(|i| i.is_active())
            .collect();
        let active_rollout = self.store.active_rollout(&deployment.app).await?;

        let plan = plan_app(
            deployment,
            active_rollout.as_ref(),
            &observed,
            &self.unhealthy_streaks,
            now,
        );

        if plan.is_empty() {
            return Ok(());
        }

        self.apply_plan(deployment, plan, now).await
    }

    async fn apply_plan(&self, deployment: &Deployment, plan: Plan, now: DateTime<Utc>) -> Result<()> {
        let app = &deployment.app;

        for transition in plan.transitions {
            match transition {
                RolloutTransition::Begin {
                    from_image,
                    to_image,
                } => {
                    info!(%app, %from_image, %to_image, "Beginning rollout");
                    self.store
                        .begin_rollout(app, &from_image, &to_image, now)
                        .await?;
                }
                RolloutTransition::Advance { rollout_id, phase } => {
                    info!(%app, ?phase, "Rollout advanced");
                    self.store.set_rollout_phase(&rollout_id, phase, now).await?;
                }
                RolloutTransition::Complete { rollout_id } => {
                    info!(%app, "Rollout completed");
                    self.store
                        .finish_rollout(&rollout_id, RolloutPhase::Completed, None, now)
                        .await?;
                }
                RolloutTransition::RollBack {
                    rollout_id,
                    restore_image,
                } => {
                    warn!(%app, %restore_image, "Rollout health gate failed, rolling back");
                    let mut spec = deployment.spec();
                    spec.image = restore_image;
                    self.store.apply(spec, SYSTEM_USER).await?;
                    self.store
                        .set_rollout_phase(&rollout_id, RolloutPhase::RollingBack, now)
                        .await?;
                }
                RolloutTransition::FinishRolledBack { rollout_id } => {
                    warn!(%app, "Rollback finished");
                    self.store
                        .finish_rollout(&rollout_id, RolloutPhase::RolledBack, None, now)
                        .await?;
                }
                RolloutTransition::Supersede { rollout_id, reason } => {
                    info!(%app, %reason, "Rollout superseded");
                    self.store
                        .finish_rollout(&rollout_id, RolloutPhase::Failed, Some(&reason), now)
                        .await?;
                }
            }
        }

        if !plan.actions.is_empty() {
            debug!(%app, count = plan.actions.len(), "Executing planned actions");
            let results = join_all(
                plan.actions
                    .into_iter()
                    .map(|action| self.executor.execute(action)),
            )
            .await;

            for result in results {
                if let Err(e) = result {
                    error!(%app, "Action execution failed: {}", e);
                }
            }
        }

        Ok(())
    }

    fn update_streaks(&mut self, snapshot: &ClusterSnapshot) {
        let mut seen = HashSet::new();
        for instance in &snapshot.instances {
            seen.insert(instance.id.clone());
            if instance.health == steward_cluster::HealthState::Unhealthy {
                *self.unhealthy_streaks.entry(instance.id.clone()).or_default() += 1;
            } else {
                self.unhealthy_streaks.remove(&instance.id);
            }
        }
        self.unhealthy_streaks.retain(|id, _| seen.contains(id));
    }
}
