use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use steward_engine::Rollout;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/rollouts", get(list_rollouts))
}

#[derive(Debug, Deserialize)]
struct RolloutQuery {
    app: Option<String>,
    limit: Option<i64>,
}

async fn list_rollouts(
    State(state): State<AppState>,
    Query(query): Query<RolloutQuery>,
) -> ApiResult<Json<Vec<Rollout>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let rollouts = state
        .store
        .list_rollouts(query.app.as_deref(), limit)
        .await?;

    Ok(Json(rollouts))
}
