pub mod actions;
pub mod deployments;
pub mod health;
pub mod rollouts;

use crate::{identity::identity_middleware, state::AppState};
use axum::{middleware, Router};
use steward_engine::{DeploymentStore, ObserverHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_app(store: DeploymentStore, observer: ObserverHandle) -> Router {
    let state = AppState::new(store, observer);

    // Allow CORS for local development (dashboards on a different port)
    let cors = CorsLayer::permissive();

    Router::new()
        .merge(health::routes()) // Health routes don't need identity
        .merge(
            deployments::routes()
                .merge(rollouts::routes())
                .merge(actions::routes())
                .layer(middleware::from_fn(identity_middleware)),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
