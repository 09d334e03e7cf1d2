//! Fixture builders shared by unit tests.

use chrono::Utc;
use steward_cluster::{HealthState, Instance, InstanceState};
use steward_core::{HealthCheckSpec, RolloutPolicy};

use crate::rollout::{Rollout, RolloutPhase};
use crate::store::Deployment;

pub(crate) fn deployment(app: &str, image: &str, replicas: u32) -> Deployment {
    let now = Utc::now();
    Deployment {
        id: format!("dep-{app}"),
        app: app.to_string(),
        image: image.to_string(),
        replicas,
        health_check: HealthCheckSpec::default(),
        rollout: RolloutPolicy::default(),
        revision: 1,
        paused: false,
        applied_by: "tests".to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn instance(id: &str, app: &str, image: &str, health: HealthState) -> Instance {
    Instance {
        id: id.to_string(),
        app: app.to_string(),
        image: image.to_string(),
        state: InstanceState::Running,
        health,
        started_at: Utc::now(),
    }
}

pub(crate) fn rollout_row(app: &str, from: &str, to: &str, phase: RolloutPhase) -> Rollout {
    let now = Utc::now();
    Rollout {
        id: format!("ro-{app}"),
        app: app.to_string(),
        from_image: from.to_string(),
        to_image: to.to_string(),
        phase,
        phase_started_at: now,
        started_at: now,
        finished_at: None,
        error: None,
    }
}
