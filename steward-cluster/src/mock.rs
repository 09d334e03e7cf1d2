//! In-memory cluster backend for tests.
//!
//! Instances live in a mutex-guarded vector; tests flip per-instance
//! health and inject start failures to exercise retry paths.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{ClusterError, Result};
use crate::{ClusterApi, HealthState, Instance, InstanceState};

pub struct MockCluster {
    instances: Mutex<Vec<Instance>>,
    next_id: AtomicU64,
    spawn_health: Mutex<HealthState>,
    fail_starts: AtomicU32,
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            spawn_health: Mutex::new(HealthState::Healthy),
            fail_starts: AtomicU32::new(0),
        }
    }

    /// Health newly started instances report. Defaults to healthy.
    pub fn set_spawn_health(&self, health: HealthState) {
        *self.spawn_health.lock().expect("mock lock poisoned") = health;
    }

    /// Override the health of one instance.
    pub fn set_health(&self, id: &str, health: HealthState) {
        let mut instances = self.instances.lock().expect("mock lock poisoned");
        if let Some(instance) = instances.iter_mut().find(|i| i.id == id) {
            instance.health = health;
        }
    }

    /// Override the health of every instance of an app running `image`.
    pub fn set_image_health(&self, app: &str, image: &str, health: HealthState) {
        let mut instances = self.instances.lock().expect("mock lock poisoned");
        for instance in instances
            .iter_mut()
            .filter(|i| i.app == app && i.image == image)
        {
            instance.health = health;
        }
    }

    /// Make the next `count` start calls fail.
    pub fn fail_next_starts(&self, count: u32) {
        self.fail_starts.store(count, Ordering::SeqCst);
    }

    pub fn instance_count(&self, app: &str) -> usize {
        self.instances
            .lock()
            .expect("mock lock poisoned")
            .iter()
            .filter(|i| i.app == app)
            .count()
    }

    pub fn images_of(&self, app: &str) -> Vec<String> {
        self.instances
            .lock()
            .expect("mock lock poisoned")
            .iter()
            .filter(|i| i.app == app)
            .map(|i| i.image.clone())
            .collect()
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ClusterApi for MockCluster {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        Ok(self.instances.lock().expect("mock lock poisoned").clone())
    }

    async fn start_instance(&self, app: &str, image: &str) -> Result<Instance> {
        let failures = self.fail_starts.load(Ordering::SeqCst);
        if failures > 0 {
            self.fail_starts.store(failures - 1, Ordering::SeqCst);
            return Err(ClusterError::Api {
                status: 503,
                message: "mock start failure".to_string(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let instance = Instance {
            id: format!("{}-{}", app, n),
            app: app.to_string(),
            image: image.to_string(),
            state: InstanceState::Running,
            health: *self.spawn_health.lock().expect("mock lock poisoned"),
            started_at: Utc::now(),
        };

        self.instances
            .lock()
            .expect("mock lock poisoned")
            .push(instance.clone());
        Ok(instance)
    }

    async fn stop_instance(&self, id: &str) -> Result<()> {
        let mut instances = self.instances.lock().expect("mock lock poisoned");
        let before = instances.len();
        instances.retain(|i| i.id != id);
        if instances.len() == before {
            return Err(ClusterError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
