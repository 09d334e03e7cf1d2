//! Desired-state persistence.
//!
//! One `deployments` row per application holds the last-applied spec; every
//! material change appends to `revisions` so rollback always has a concrete
//! target. Rollout and action rows live here too so the engine has a single
//! database surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use steward_core::{DeploymentSpec, HealthCheckSpec, RolloutPolicy};
use uuid::Uuid;

use crate::action::{Action, ActionKind, ActionStatus};
use crate::error::{EngineError, Result};
use crate::rollout::{Rollout, RolloutPhase};

/// A stored deployment: the applied spec plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub app: String,
    pub image: String,
    pub replicas: u32,
    pub health_check: HealthCheckSpec,
    pub rollout: RolloutPolicy,
    pub revision: i64,
    pub paused: bool,
    pub applied_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// The spec portion of this record, as an operator would re-apply it.
    pub fn spec(&self) -> DeploymentSpec {
        DeploymentSpec {
            app: self.app.clone(),
            image: self.image.clone(),
            replicas: self.replicas,
            health_check: self.health_check.clone(),
            rollout: self.rollout.clone(),
        }
    }
}

/// One line of apply history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub app: String,
    pub revision: i64,
    pub image: String,
    pub replicas: u32,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct DeploymentFilters {
    pub paused: Option<bool>,
    pub applied_by: Option<String>,
}

#[derive(Clone)]
pub struct DeploymentStore {
    pool: SqlitePool,
}

impl DeploymentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply a spec: insert a new deployment or update an existing one.
    ///
    /// Re-applying an identical spec is a no-op. Any material change bumps
    /// the revision and appends a revision row.
    pub async fn apply(&self, spec: DeploymentSpec, applied_by: &str) -> Result<Deployment> {
        spec.validate()?;

        let now = Utc::now();
        let health_check = serde_json::to_string(&spec.health_check)?;
        let rollout_policy = serde_json::to_string(&spec.rollout)?;

        let existing = match self.get(&spec.app).await {
            Ok(deployment) => Some(deployment),
            Err(EngineError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        match existing {
            Some(current) if current.spec() == spec => Ok(current),
            Some(current) => {
                let revision = current.revision + 1;

                sqlx::query(
                    "UPDATE deployments
                     SET image = ?, replicas = ?, health_check = ?, rollout_policy = ?,
                         revision = ?, applied_by = ?, updated_at = ?
                     WHERE app = ?",
                )
                .bind(&spec.image)
                .bind(spec.replicas as i64)
                .bind(&health_check)
                .bind(&rollout_policy)
                .bind(revision)
                .bind(applied_by)
                .bind(now.timestamp())
                .bind(&spec.app)
                .execute(&self.pool)
                .await?;

                self.record_revision(&spec, revision, applied_by, now).await?;
                self.get(&spec.app).await
            }
            None => {
                let id = Uuid::new_v4().to_string();

                sqlx::query(
                    "INSERT INTO deployments
                     (id, app, image, replicas, health_check, rollout_policy, revision, paused, applied_by, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
                )
                .bind(&id)
                .bind(&spec.app)
                .bind(&spec.image)
                .bind(spec.replicas as i64)
                .bind(&health_check)
                .bind(&rollout_policy)
                .bind(1i64)
                .bind(applied_by)
                .bind(now.timestamp())
                .bind(now.timestamp())
                .execute(&self.pool)
                .await?;

                self.record_revision(&spec, 1, applied_by, now).await?;
                self.get(&spec.app).await
            }
        }
    }

    async fn record_revision(
        &self,
        spec: &DeploymentSpec,
        revision: i64,
        applied_by: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO revisions (id, app, revision, image, replicas, applied_by, applied_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&spec.app)
        .bind(revision)
        .bind(&spec.image)
        .bind(spec.replicas as i64)
        .bind(applied_by)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a single deployment by app name.
    pub async fn get(&self, app: &str) -> Result<Deployment> {
        let row = sqlx::query_as::<_, DeploymentRow>("SELECT * FROM deployments WHERE app = ?")
            .bind(app)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(app.to_string()))?;

        row.try_into()
    }

    /// List deployments with optional filters.
    pub async fn list(&self, filters: DeploymentFilters) -> Result<Vec<Deployment>> {
        let mut query = "SELECT * FROM deployments WHERE 1=1".to_string();

        if filters.paused.is_some() {
            query.push_str(" AND paused = ?");
        }
        if filters.applied_by.is_some() {
            query.push_str(" AND applied_by = ?");
        }

        query.push_str(" ORDER BY app ASC");

        let mut q = sqlx::query_as::<_, DeploymentRow>(&query);

        if let Some(paused) = filters.paused {
            q = q.bind(paused);
        }
        if let Some(applied_by) = &filters.applied_by {
            q = q.bind(applied_by);
        }

        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    /// Delete a deployment and everything recorded about it.
    pub async fn delete(&self, app: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM deployments WHERE app = ?")
            .bind(app)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(app.to_string()));
        }

        for table in ["revisions", "rollouts", "actions"] {
            sqlx::query(&format!("DELETE FROM {} WHERE app = ?", table))
                .bind(app)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Pause or resume reconciliation for an app.
    pub async fn set_paused(&self, app: &str, paused: bool) -> Result<Deployment> {
        let result = sqlx::query("UPDATE deployments SET paused = ?, updated_at = ? WHERE app = ?")
            .bind(paused)
            .bind(Utc::now().timestamp())
            .bind(app)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(app.to_string()));
        }

        self.get(app).await
    }

    /// The most recent revision running a different image than the current
    /// one; this is what a rollback re-applies.
    pub async fn previous_image(&self, app: &str) -> Result<Option<Revision>> {
        let current = self.get(app).await?;

        let row = sqlx::query_as::<_, RevisionRow>(
            "SELECT * FROM revisions WHERE app = ? AND image != ? ORDER BY revision DESC LIMIT 1",
        )
        .bind(app)
        .bind(&current.image)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    // --- rollouts ---

    pub async fn begin_rollout(
        &self,
        app: &str,
        from_image: &str,
        to_image: &str,
        now: DateTime<Utc>,
    ) -> Result<Rollout> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO rollouts (id, app, from_image, to_image, phase, phase_started_at, started_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(app)
        .bind(from_image)
        .bind(to_image)
        .bind(RolloutPhase::Canary)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        self.get_rollout(&id).await
    }

    pub async fn get_rollout(&self, id: &str) -> Result<Rollout> {
        let row = sqlx::query_as::<_, RolloutRow>("SELECT * FROM rollouts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        Ok(row.into())
    }

    /// The unfinished rollout for an app, if any.
    pub async fn active_rollout(&self, app: &str) -> Result<Option<Rollout>> {
        let row = sqlx::query_as::<_, RolloutRow>(
            "SELECT * FROM rollouts WHERE app = ? AND finished_at IS NULL ORDER BY started_at DESC LIMIT 1",
        )
        .bind(app)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn set_rollout_phase(
        &self,
        id: &str,
        phase: RolloutPhase,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE rollouts SET phase = ?, phase_started_at = ? WHERE id = ?")
            .bind(phase)
            .bind(now.timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(id.to_string()));
        }

        Ok(())
    }

    pub async fn finish_rollout(
        &self,
        id: &str,
        phase: RolloutPhase,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE rollouts SET phase = ?, finished_at = ?, error = ? WHERE id = ?",
        )
        .bind(phase)
        .bind(now.timestamp())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(id.to_string()));
        }

        Ok(())
    }

    pub async fn list_rollouts(&self, app: Option<&str>, limit: i64) -> Result<Vec<Rollout>> {
        let mut query = "SELECT * FROM rollouts WHERE 1=1".to_string();

        if app.is_some() {
            query.push_str(" AND app = ?");
        }
        query.push_str(" ORDER BY started_at DESC LIMIT ?");

        let mut q = sqlx::query_as::<_, RolloutRow>(&query);
        if let Some(app) = app {
            q = q.bind(app);
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    // --- actions ---

    pub async fn record_action(
        &self,
        app: &str,
        kind: ActionKind,
        image: Option<&str>,
        instance_id: Option<&str>,
    ) -> Result<Action> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO actions (id, app, kind, image, instance_id, status, attempts, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(app)
        .bind(kind)
        .bind(image)
        .bind(instance_id)
        .bind(ActionStatus::Pending)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        self.get_action(&id).await
    }

    pub async fn get_action(&self, id: &str) -> Result<Action> {
        let row = sqlx::query_as::<_, ActionRow>("SELECT * FROM actions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        Ok(row.into())
    }

    pub async fn set_action_running(&self, id: &str, attempts: u32) -> Result<()> {
        sqlx::query("UPDATE actions SET status = ?, attempts = ? WHERE id = ?")
            .bind(ActionStatus::Running)
            .bind(attempts as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn finish_action(
        &self,
        id: &str,
        status: ActionStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE actions SET status = ?, error = ?, finished_at = ? WHERE id = ?")
            .bind(status)
            .bind(error)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Unsettled actions for an app; while any exist the planner holds off.
    pub async fn pending_actions(&self, app: &str) -> Result<Vec<Action>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            "SELECT * FROM actions WHERE app = ? AND status IN ('pending', 'running')",
        )
        .bind(app)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_actions(&self, app: Option<&str>, limit: i64) -> Result<Vec<Action>> {
        let mut query = "SELECT * FROM actions WHERE 1=1".to_string();

        if app.is_some() {
            query.push_str(" AND app = ?");
        }
        query.push_str(" ORDER BY created_at DESC LIMIT ?");

        let mut q = sqlx::query_as::<_, ActionRow>(&query);
        if let Some(app) = app {
            q = q.bind(app);
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// Internal row types for sqlx
#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: String,
    app: String,
    image: String,
    replicas: i64,
    health_check: String,
    rollout_policy: String,
    revision: i64,
    paused: bool,
    applied_by: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct RevisionRow {
    id: String,
    app: String,
    revision: i64,
    image: String,
    replicas: i64,
    applied_by: String,
    applied_at: i64,
}

#[derive(sqlx::FromRow)]
struct RolloutRow {
    id: String,
    app: String,
    from_image: String,
    to_image: String,
    phase: RolloutPhase,
    phase_started_at: i64,
    started_at: i64,
    finished_at: Option<i64>,
    error: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: String,
    app: String,
    kind: ActionKind,
    image: Option<String>,
    instance_id: Option<String>,
    status: ActionStatus,
    attempts: i64,
    error: Option<String>,
    created_at: i64,
    finished_at: Option<i64>,
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = EngineError;

    fn try_from(row: DeploymentRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            app: row.app,
            image: row.image,
            replicas: row.replicas as u32,
            health_check: serde_json::from_str(&row.health_check)?,
            rollout: serde_json::from_str(&row.rollout_policy)?,
            revision: row.revision,
            paused: row.paused,
            applied_by: row.applied_by,
            created_at: timestamp(row.created_at),
            updated_at: timestamp(row.updated_at),
        })
    }
}

impl From<RevisionRow> for Revision {
    fn from(row: RevisionRow) -> Self {
        Self {
            id: row.id,
            app: row.app,
            revision: row.revision,
            image: row.image,
            replicas: row.replicas as u32,
            applied_by: row.applied_by,
            applied_at: timestamp(row.applied_at),
        }
    }
}

impl From<RolloutRow> for Rollout {
    fn from(row: RolloutRow) -> Self {
        Self {
            id: row.id,
            app: row.app,
            from_image: row.from_image,
            to_image: row.to_image,
            phase: row.phase,
            phase_started_at: timestamp(row.phase_started_at),
            started_at: timestamp(row.started_at),
            finished_at: row.finished_at.map(timestamp),
            error: row.error,
        }
    }
}

impl From<ActionRow> for Action {
    fn from(row: ActionRow) -> Self {
        Self {
            id: row.id,
            app: row.app,
            kind: row.kind,
            image: row.image,
            instance_id: row.instance_id,
            status: row.status,
            attempts: row.attempts,
            error: row.error,
            created_at: timestamp(row.created_at),
            finished_at: row.finished_at.map(timestamp),
        }
    }
}
