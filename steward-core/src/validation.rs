//! Centralized validation for operator-supplied input.
//!
//! Every value that reaches the store or the cluster API passes through
//! here first, so the rules live in one place.

use crate::error::{Result, StewardError};
use crate::spec::{HealthCheckSpec, RolloutPolicy};

const MAX_APP_NAME_LEN: usize = 63;
const MAX_IMAGE_REF_LEN: usize = 255;
const MAX_REPLICAS: u32 = 256;

/// Validate an application name.
///
/// Names follow the DNS-label convention: lowercase alphanumerics and
/// hyphens, starting and ending with an alphanumeric, at most 63 chars.
pub fn validate_app_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_APP_NAME_LEN {
        return Err(StewardError::Validation(format!(
            "App name must be between 1 and {} characters",
            MAX_APP_NAME_LEN
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(StewardError::Validation(format!(
            "App name '{}' may only contain lowercase letters, digits, and hyphens",
            name
        )));
    }

    let first = name.chars().next().unwrap_or('-');
    let last = name.chars().last().unwrap_or('-');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(StewardError::Validation(format!(
            "App name '{}' must start and end with a letter or digit",
            name
        )));
    }

    Ok(())
}

/// Validate an image reference.
///
/// Requires an explicit tag (or digest) so the desired state is always
/// pinned; a bare repository name would make rollout diffing meaningless.
pub fn validate_image_ref(image: &str) -> Result<()> {
    if image.is_empty() || image.len() > MAX_IMAGE_REF_LEN {
        return Err(StewardError::Validation(format!(
            "Image reference must be between 1 and {} characters",
            MAX_IMAGE_REF_LEN
        )));
    }

    if image
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(StewardError::Validation(
            "Image reference contains whitespace or control characters".to_string(),
        ));
    }

    if !image
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@".contains(c))
    {
        return Err(StewardError::Validation(format!(
            "Image reference '{}' contains invalid characters",
            image
        )));
    }

    // The tag separator is a ':' after the last path segment. A ':' before
    // the last '/' is a registry port, not a tag.
    let after_slash = image.rsplit('/').next().unwrap_or(image);
    let tag = after_slash.split_once(':').map(|(_, t)| t);
    match tag {
        Some(t) if !t.is_empty() => Ok(()),
        _ => Err(StewardError::Validation(format!(
            "Image reference '{}' must carry an explicit tag or digest",
            image
        ))),
    }
}

pub fn validate_replicas(replicas: u32) -> Result<()> {
    if replicas > MAX_REPLICAS {
        return Err(StewardError::Validation(format!(
            "Replica count {} exceeds the maximum of {}",
            replicas, MAX_REPLICAS
        )));
    }
    Ok(())
}

pub fn validate_health_check(hc: &HealthCheckSpec) -> Result<()> {
    if !hc.path.starts_with('/') {
        return Err(StewardError::Validation(format!(
            "Health check path '{}' must start with '/'",
            hc.path
        )));
    }
    if hc.port == 0 {
        return Err(StewardError::Validation(
            "Health check port must be non-zero".to_string(),
        ));
    }
    if hc.interval_secs == 0 {
        return Err(StewardError::Validation(
            "Health check interval must be at least 1 second".to_string(),
        ));
    }
    if hc.failure_threshold == 0 {
        return Err(StewardError::Validation(
            "Health check failure threshold must be at least 1".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_rollout_policy(policy: &RolloutPolicy) -> Result<()> {
    if policy.canary_replicas == 0 {
        return Err(StewardError::Validation(
            "Rollout canary_replicas must be at least 1".to_string(),
        ));
    }
    if !(policy.healthy_fraction > 0.0 && policy.healthy_fraction <= 1.0) {
        return Err(StewardError::Validation(format!(
            "Rollout healthy_fraction {} must be within (0, 1]",
            policy.healthy_fraction
        )));
    }
    if policy.timeout_secs > 0 && policy.timeout_secs <= policy.observe_secs {
        return Err(StewardError::Validation(format!(
            "Rollout timeout ({}s) must exceed the observe window ({}s)",
            policy.timeout_secs, policy.observe_secs
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_names() {
        assert!(validate_app_name("shop-api").is_ok());
        assert!(validate_app_name("a").is_ok());
        assert!(validate_app_name("app2").is_ok());

        assert!(validate_app_name("").is_err());
        assert!(validate_app_name("-leading").is_err());
        assert!(validate_app_name("trailing-").is_err());
        assert!(validate_app_name("Upper").is_err());
        assert!(validate_app_name("under_score").is_err());
        assert!(validate_app_name(&"x".repeat(64)).is_err());
    }

    #[test]
    fn image_refs() {
        assert!(validate_image_ref("nginx:1.25").is_ok());
        assert!(validate_image_ref("registry.local/shop/api:1.4.2").is_ok());
        assert!(validate_image_ref("localhost:5000/app:v3").is_ok());
        assert!(validate_image_ref("app@sha256:abcd").is_ok());

        assert!(validate_image_ref("").is_err());
        assert!(validate_image_ref("nginx").is_err());
        assert!(validate_image_ref("nginx:").is_err());
        assert!(validate_image_ref("localhost:5000/app").is_err());
        assert!(validate_image_ref("bad image:1.0").is_err());
        assert!(validate_image_ref("bad\nimage:1.0").is_err());
    }

    #[test]
    fn replica_bounds() {
        assert!(validate_replicas(0).is_ok());
        assert!(validate_replicas(256).is_ok());
        assert!(validate_replicas(257).is_err());
    }

    #[test]
    fn rollout_policy_bounds() {
        let mut policy = RolloutPolicy::default();
        assert!(validate_rollout_policy(&policy).is_ok());

        policy.healthy_fraction = 0.0;
        assert!(validate_rollout_policy(&policy).is_err());

        policy.healthy_fraction = 1.0;
        policy.timeout_secs = policy.observe_secs;
        assert!(validate_rollout_policy(&policy).is_err());

        // Zero timeout disables the rollback deadline entirely.
        policy.timeout_secs = 0;
        assert!(validate_rollout_policy(&policy).is_ok());
    }
}
