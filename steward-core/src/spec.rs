use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validation;

/// The desired state an operator declares for one application.
///
/// This is the document submitted via `steward apply` and persisted by the
/// store. Everything the control loop does is derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Application name, the unique key for the deployment.
    pub app: String,

    /// Full image reference to run, e.g. `registry.local/shop/api:1.4.2`.
    pub image: String,

    /// Number of instances to keep running. Zero means scale to zero.
    pub replicas: u32,

    #[serde(default)]
    pub health_check: HealthCheckSpec,

    #[serde(default)]
    pub rollout: RolloutPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// HTTP path probed inside the instance.
    #[serde(default = "default_health_path")]
    pub path: String,

    /// Port the probe connects to.
    #[serde(default = "default_health_port")]
    pub port: u16,

    /// Seconds between probes.
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    /// Consecutive failed observations before an instance is replaced.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

/// How an image change is rolled out: canary first, then half the fleet,
/// then everything, each phase gated on observed health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutPolicy {
    /// Instances of the new image to run during the canary phase.
    #[serde(default = "default_canary_replicas")]
    pub canary_replicas: u32,

    /// Minimum seconds a phase must be observed before it may advance.
    #[serde(default = "default_observe_secs")]
    pub observe_secs: u64,

    /// Fraction of new-image instances that must be healthy to advance.
    #[serde(default = "default_healthy_fraction")]
    pub healthy_fraction: f64,

    /// Seconds a phase may sit without advancing before rollback triggers.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_port() -> u16 {
    8080
}

fn default_health_interval() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_canary_replicas() -> u32 {
    1
}

fn default_observe_secs() -> u64 {
    30
}

fn default_healthy_fraction() -> f64 {
    0.9
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            port: default_health_port(),
            interval_secs: default_health_interval(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            canary_replicas: default_canary_replicas(),
            observe_secs: default_observe_secs(),
            healthy_fraction: default_healthy_fraction(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DeploymentSpec {
    /// Validate the whole spec. Invalid specs are rejected before any write.
    pub fn validate(&self) -> Result<()> {
        validation::validate_app_name(&self.app)?;
        validation::validate_image_ref(&self.image)?;
        validation::validate_replicas(self.replicas)?;
        validation::validate_health_check(&self.health_check)?;
        validation::validate_rollout_policy(&self.rollout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DeploymentSpec {
        DeploymentSpec {
            app: "shop-api".to_string(),
            image: "registry.local/shop/api:1.4.2".to_string(),
            replicas: 3,
            health_check: HealthCheckSpec::default(),
            rollout: RolloutPolicy::default(),
        }
    }

    #[test]
    fn valid_spec_passes() {
        spec().validate().expect("spec should validate");
    }

    #[test]
    fn zero_replicas_is_valid() {
        let mut s = spec();
        s.replicas = 0;
        s.validate().expect("scale-to-zero should validate");
    }

    #[test]
    fn yaml_defaults_fill_in() {
        let doc = "app: shop-api\nimage: registry.local/shop/api:1.4.2\nreplicas: 2\n";
        let parsed: DeploymentSpec = serde_yaml_ng::from_str(doc).expect("yaml should parse");
        assert_eq!(parsed.replicas, 2);
        assert_eq!(parsed.health_check.path, "/health");
        assert_eq!(parsed.rollout.canary_replicas, 1);
        parsed.validate().expect("parsed spec should validate");
    }
}
