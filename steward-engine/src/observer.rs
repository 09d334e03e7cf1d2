//! Live cluster observation.
//!
//! A polling loop snapshots the cluster through [`ClusterApi`] and keeps
//! the latest snapshot readable by anyone holding an [`ObserverHandle`].
//! Consecutive snapshots are diffed into [`ClusterEvent`]s on a broadcast
//! channel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use steward_cluster::{ClusterApi, HealthState, Instance};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};
use tracing::{debug, error};

use crate::error::Result;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the cluster reported at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub taken_at: DateTime<Utc>,
    pub instances: Vec<Instance>,
}

impl ClusterSnapshot {
    /// Instances belonging to one app.
    pub fn app(&self, app: &str) -> Vec<&Instance> {
        self.instances.iter().filter(|i| i.app == app).collect()
    }

    /// All app names present in the snapshot.
    pub fn apps(&self) -> BTreeSet<&str> {
        self.instances.iter().map(|i| i.app.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    InstanceStarted {
        app: String,
        id: String,
        image: String,
    },
    InstanceStopped {
        app: String,
        id: String,
    },
    HealthChanged {
        app: String,
        id: String,
        from: HealthState,
        to: HealthState,
    },
}

/// Change events between two consecutive snapshots.
pub fn diff_snapshots(old: &ClusterSnapshot, new: &ClusterSnapshot) -> Vec<ClusterEvent> {
    let old_by_id: BTreeMap<&str, &Instance> =
        old.instances.iter().map(|i| (i.id.as_str(), i)).collect();
    let new_by_id: BTreeMap<&str, &Instance> =
        new.instances.iter().map(|i| (i.id.as_str(), i)).collect();

    let mut events = Vec::new();

    for (id, instance) in &new_by_id {
        match old_by_id.get(id) {
            None => events.push(ClusterEvent::InstanceStarted {
                app: instance.app.clone(),
                id: instance.id.clone(),
                image: instance.image.clone(),
            }),
            Some(previous) if previous.health != instance.health => {
                events.push(ClusterEvent::HealthChanged {
                    app: instance.app.clone(),
                    id: instance.id.clone(),
                    from: previous.health,
                    to: instance.health,
                })
            }
            Some(_) => {}
        }
    }

    for (id, instance) in &old_by_id {
        if !new_by_id.contains_key(id) {
            events.push(ClusterEvent::InstanceStopped {
                app: instance.app.clone(),
                id: instance.id.clone(),
            });
        }
    }

    events
}

pub struct ClusterObserver {
    cluster: Arc<dyn ClusterApi>,
    latest: Arc<RwLock<Option<ClusterSnapshot>>>,
    events: broadcast::Sender<ClusterEvent>,
}

/// Cheap clone handed to the reconciler and the API.
#[derive(Clone)]
pub struct ObserverHandle {
    latest: Arc<RwLock<Option<ClusterSnapshot>>>,
    events: broadcast::Sender<ClusterEvent>,
}

impl ObserverHandle {
    pub async fn latest(&self) -> Option<ClusterSnapshot> {
        self.latest.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }
}

impl ClusterObserver {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            cluster,
            latest: Arc::new(RwLock::new(None)),
            events,
        }
    }

    pub fn handle(&self) -> ObserverHandle {
        ObserverHandle {
            latest: self.latest.clone(),
            events: self.events.clone(),
        }
    }

    /// The polling loop. A failed poll keeps the previous snapshot; readers
    /// judge freshness by `taken_at`.
    pub async fn run(self, poll_interval: Duration) {
        let mut ticker = interval(poll_interval);

        debug!(
            backend = self.cluster.name(),
            "Cluster observer running (polls every {:?})", poll_interval
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.poll_once().await {
                error!("Cluster poll failed: {}", e);
            }
        }
    }

    /// One poll: snapshot, diff, publish.
    pub async fn poll_once(&self) -> Result<()> {
        let instances = self.cluster.list_instances().await?;
        let snapshot = ClusterSnapshot {
            taken_at: Utc::now(),
            instances,
        };

        let mut latest = self.latest.write().await;
        if let Some(previous) = latest.as_ref() {
            for event in diff_snapshots(previous, &snapshot) {
                debug!(?event, "Cluster change observed");
                // Nobody listening is fine; events are advisory.
                let _ = self.events.send(event);
            }
        }
        *latest = Some(snapshot);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::instance;

    fn snapshot(instances: Vec<Instance>) -> ClusterSnapshot {
        ClusterSnapshot {
            taken_at: Utc::now(),
            instances,
        }
    }

    #[test]
    fn diff_reports_starts_stops_and_health_flips() {
        let old = snapshot(vec![
            instance("a-1", "a", "a:1", HealthState::Healthy),
            instance("a-2", "a", "a:1", HealthState::Healthy),
        ]);
        let new = snapshot(vec![
            instance("a-2", "a", "a:1", HealthState::Unhealthy),
            instance("a-3", "a", "a:2", HealthState::Unknown),
        ]);

        let events = diff_snapshots(&old, &new);

        assert!(events.contains(&ClusterEvent::InstanceStopped {
            app: "a".to_string(),
            id: "a-1".to_string()
        }));
        assert!(events.contains(&ClusterEvent::InstanceStarted {
            app: "a".to_string(),
            id: "a-3".to_string(),
            image: "a:2".to_string()
        }));
        assert!(events.contains(&ClusterEvent::HealthChanged {
            app: "a".to_string(),
            id: "a-2".to_string(),
            from: HealthState::Healthy,
            to: HealthState::Unhealthy
        }));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn identical_snapshots_diff_to_nothing() {
        let instances = vec![instance("a-1", "a", "a:1", HealthState::Healthy)];
        let old = snapshot(instances.clone());
        let new = snapshot(instances);

        assert!(diff_snapshots(&old, &new).is_empty());
    }

    #[tokio::test]
    async fn first_poll_emits_no_events() {
        use steward_cluster::mock::MockCluster;

        let cluster = Arc::new(MockCluster::new());
        cluster.start_instance("a", "a:1").await.unwrap();

        let observer = ClusterObserver::new(cluster.clone());
        let handle = observer.handle();
        let mut rx = handle.subscribe();

        observer.poll_once().await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.latest().await.unwrap().instances.len(), 1);

        // Second poll after a change does emit.
        cluster.start_instance("a", "a:1").await.unwrap();
        observer.poll_once().await.unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
