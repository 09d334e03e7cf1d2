use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use steward_engine::Action;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/actions", get(list_actions))
}

#[derive(Debug, Deserialize)]
struct ActionQuery {
    app: Option<String>,
    limit: Option<i64>,
}

async fn list_actions(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
) -> ApiResult<Json<Vec<Action>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let actions = state.store.list_actions(query.app.as_deref(), limit).await?;

    Ok(Json(actions))
}
