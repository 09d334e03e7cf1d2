use steward_engine::{DeploymentStore, ObserverHandle};

#[derive(Clone)]
pub struct AppState {
    pub store: DeploymentStore,
    pub observer: ObserverHandle,
}

impl AppState {
    pub fn new(store: DeploymentStore, observer: ObserverHandle) -> Self {
        Self { store, observer }
    }
}
