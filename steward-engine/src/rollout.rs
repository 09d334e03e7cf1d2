//! Health-gated rollout progression.
//!
//! Each image change moves through canary → partial → full, one persisted
//! [`Rollout`] row per attempt. The decision logic here is pure: it looks
//! at the deployment, the rollout row, and the observed instances, and
//! returns transitions plus instance actions. Time always arrives as a
//! parameter so gating is testable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use steward_cluster::{HealthState, Instance};

use crate::reconciler::{Plan, PlannedAction};
use crate::store::Deployment;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rollout {
    pub id: String,
    pub app: String,
    pub from_image: String,
    pub to_image: String,
    pub phase: RolloutPhase,
    pub phase_started_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum RolloutPhase {
    Canary,
    Partial,
    Full,
    Completed,
    RollingBack,
    RolledBack,
    Failed,
}

impl RolloutPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutPhase::Completed | RolloutPhase::RolledBack | RolloutPhase::Failed
        )
    }

    fn next(&self) -> Option<RolloutPhase> {
        match self {
            RolloutPhase::Canary => Some(RolloutPhase::Partial),
            RolloutPhase::Partial => Some(RolloutPhase::Full),
            _ => None,
        }
    }
}

/// A decided change to a rollout row, applied by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum RolloutTransition {
    Begin {
        from_image: String,
        to_image: String,
    },
    Advance {
        rollout_id: String,
        phase: RolloutPhase,
    },
    Complete {
        rollout_id: String,
    },
    /// Health gate timed out: revert the desired image and start unwinding.
    RollBack {
        rollout_id: String,
        restore_image: String,
    },
    /// The unwind finished; every new-image instance is gone.
    FinishRolledBack {
        rollout_id: String,
    },
    /// A newer apply replaced this rollout before it finished.
    Supersede {
        rollout_id: String,
        reason: String,
    },
}

/// New-image instance count a phase aims for.
fn target_new(phase: RolloutPhase, replicas: usize, canary_replicas: usize) -> usize {
    match phase {
        RolloutPhase::Canary => canary_replicas.min(replicas),
        RolloutPhase::Partial => replicas.div_ceil(2).max(canary_replicas.min(replicas)),
        _ => replicas,
    }
}

/// Old-image instances a phase keeps around. The canary runs alongside the
/// full old fleet; later phases trade old capacity for new.
fn target_old(phase: RolloutPhase, replicas: usize, new_target: usize) -> usize {
    match phase {
        RolloutPhase::Canary => replicas,
        RolloutPhase::Partial => replicas.saturating_sub(new_target),
        _ => 0,
    }
}

/// Stop candidates, newest first, so the longest-lived instances survive.
fn newest_first<'a>(instances: &[&'a Instance]) -> Vec<&'a Instance> {
    let mut sorted = instances.to_vec();
    sorted.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    sorted
}

/// Advance, hold, or roll back an in-flight rollout.
pub fn step(
    deployment: &Deployment,
    rollout: &Rollout,
    observed: &[&Instance],
    now: DateTime<Utc>,
) -> Plan {
    let policy = &deployment.rollout;
    let replicas = deployment.replicas as usize;
    let elapsed = now - rollout.phase_started_at;

    if policy.timeout_secs > 0 && elapsed > Duration::seconds(policy.timeout_secs as i64) {
        return Plan::transition(RolloutTransition::RollBack {
            rollout_id: rollout.id.clone(),
            restore_image: rollout.from_image.clone(),
        });
    }

    let new: Vec<&Instance> = observed
        .iter()
        .copied()
        .filter(|i| i.image == rollout.to_image)
        .collect();
    // Anything not on the new image counts as old, including leftovers of
    // an earlier superseded rollout.
    let old: Vec<&Instance> = observed
        .iter()
        .copied()
        .filter(|i| i.image != rollout.to_image)
        .collect();

    let new_target = target_new(rollout.phase, replicas, policy.canary_replicas as usize);
    let old_target = target_old(rollout.phase, replicas, new_target);

    let healthy_new = new
        .iter()
        .filter(|i| i.health == HealthState::Healthy)
        .count();
    let populated = new.len() >= new_target && old.len() <= old_target;
    let fraction = healthy_new as f64 / new.len().max(1) as f64;
    let observed_long_enough = elapsed >= Duration::seconds(policy.observe_secs as i64);

    if populated && observed_long_enough && fraction >= policy.healthy_fraction {
        return match rollout.phase.next() {
            Some(phase) => Plan::transition(RolloutTransition::Advance {
                rollout_id: rollout.id.clone(),
                phase,
            }),
            None => Plan::transition(RolloutTransition::Complete {
                rollout_id: rollout.id.clone(),
            }),
        };
    }

    let mut actions = Vec::new();
    for _ in new.len()..new_target {
        actions.push(PlannedAction::Start {
            app: deployment.app.clone(),
            image: rollout.to_image.clone(),
        });
    }
    for extra in newest_first(&new).iter().take(new.len().saturating_sub(new_target)) {
        actions.push(PlannedAction::Stop {
            app: deployment.app.clone(),
            instance_id: extra.id.clone(),
        });
    }
    for retired in newest_first(&old)
        .iter()
        .take(old.len().saturating_sub(old_target))
    {
        actions.push(PlannedAction::Stop {
            app: deployment.app.clone(),
            instance_id: retired.id.clone(),
        });
    }

    Plan::actions(actions)
}

/// Unwind a failed rollout: stop every new-image instance and restore the
/// old-image fleet. The desired image was already reverted when the
/// rollback began, so steady state takes over once this finishes.
pub fn step_rollback(deployment: &Deployment, rollout: &Rollout, observed: &[&Instance]) -> Plan {
    let bad: Vec<&Instance> = observed
        .iter()
        .copied()
        .filter(|i| i.image == rollout.to_image)
        .collect();
    let restored = observed
        .iter()
        .filter(|i| i.image == rollout.from_image)
        .count();

    if bad.is_empty() {
        return Plan::transition(RolloutTransition::FinishRolledBack {
            rollout_id: rollout.id.clone(),
        });
    }

    let mut actions: Vec<PlannedAction> = bad
        .iter()
        .map(|i| PlannedAction::Stop {
            app: deployment.app.clone(),
            instance_id: i.id.clone(),
        })
        .collect();
    for _ in restored..deployment.replicas as usize {
        actions.push(PlannedAction::Start {
            app: deployment.app.clone(),
            image: rollout.from_image.clone(),
        });
    }

    Plan::actions(actions)
}
