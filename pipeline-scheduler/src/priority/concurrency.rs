//! Per-action concurrency limits.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::errors::ValidationError;

/// Concurrency limit of one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyItem {
    /// Maximum number of concurrently running tasks.
    pub max: i64,
}

/// Version one of the concurrency rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionConcurrencyV1 {
    /// Limit for clusters without their own entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ConcurrencyItem>,
    /// Limits by cluster name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub clusters: HashMap<String, ConcurrencyItem>,
}

/// Concurrency rules of an action, resolved at load time.
///
/// The wire form is `{"enable": bool, "v1": {...}}`; an enabled rule set
/// without a `v1` body fails to load.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawActionConcurrency", into = "RawActionConcurrency")]
pub enum ActionConcurrency {
    /// No limit.
    #[default]
    Disabled,
    /// Version one rules.
    V1(ActionConcurrencyV1),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawActionConcurrency {
    #[serde(default)]
    enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v1: Option<ActionConcurrencyV1>,
}

impl TryFrom<RawActionConcurrency> for ActionConcurrency {
    type Error = ValidationError;

    fn try_from(raw: RawActionConcurrency) -> Result<Self, Self::Error> {
        match (raw.enable, raw.v1) {
            (false, _) => Ok(Self::Disabled),
            (true, Some(v1)) => Ok(Self::V1(v1)),
            (true, None) => Err(ValidationError::new("action concurrency enabled without v1 rules")
                .with_field("v1")),
        }
    }
}

impl From<ActionConcurrency> for RawActionConcurrency {
    fn from(value: ActionConcurrency) -> Self {
        match value {
            ActionConcurrency::Disabled => Self::default(),
            ActionConcurrency::V1(v1) => Self {
                enable: true,
                v1: Some(v1),
            },
        }
    }
}

/// Resolves the concurrency limit for a cluster.
///
/// The cluster's own entry wins over the default. `None` means unlimited.
#[must_use]
pub fn resolve_concurrency(spec: &ActionConcurrency, cluster_name: &str) -> Option<i64> {
    match spec {
        ActionConcurrency::Disabled => None,
        ActionConcurrency::V1(v1) => v1
            .clusters
            .get(cluster_name)
            .or(v1.default.as_ref())
            .map(|item| item.max),
    }
}

/// Counts running tasks per `(action type, cluster)`.
#[derive(Debug, Default)]
pub struct ActionConcurrencyLimiter {
    running: DashMap<(String, String), i64>,
}

impl ActionConcurrencyLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a slot if the resolved limit allows it.
    pub fn try_acquire(&self, action_type: &str, cluster_name: &str, spec: &ActionConcurrency) -> bool {
        let max = resolve_concurrency(spec, cluster_name);
        let mut running = self
            .running
            .entry((action_type.to_string(), cluster_name.to_string()))
            .or_insert(0);

        if let Some(max) = max {
            if *running >= max {
                debug!(action_type, cluster_name, running = *running, max, "Action concurrency limit reached");
                return false;
            }
        }
        *running += 1;
        true
    }

    /// Returns a slot.
    pub fn release(&self, action_type: &str, cluster_name: &str) {
        let key = (action_type.to_string(), cluster_name.to_string());
        if let Some(mut running) = self.running.get_mut(&key) {
            *running = (*running - 1).max(0);
        }
        self.running.remove_if(&key, |_, running| *running == 0);
    }

    /// Number of running tasks.
    #[must_use]
    pub fn running(&self, action_type: &str, cluster_name: &str) -> i64 {
        self.running
            .get(&(action_type.to_string(), cluster_name.to_string()))
            .map_or(0, |running| *running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec() -> ActionConcurrency {
        serde_json::from_str(
            r#"{"enable": true, "v1": {"default": {"max": 2}, "clusters": {"prod": {"max": 1}}}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_cluster_entry_overrides_default() {
        let spec = spec();
        assert_eq!(resolve_concurrency(&spec, "prod"), Some(1));
        assert_eq!(resolve_concurrency(&spec, "dev"), Some(2));
        assert_eq!(resolve_concurrency(&ActionConcurrency::Disabled, "prod"), None);
    }

    #[test]
    fn test_no_default_means_unlimited_elsewhere() {
        let spec: ActionConcurrency =
            serde_json::from_str(r#"{"enable": true, "v1": {"clusters": {"prod": {"max": 3}}}}"#)
                .unwrap();
        assert_eq!(resolve_concurrency(&spec, "dev"), None);
    }

    #[test]
    fn test_load_time_validation() {
        let err = serde_json::from_str::<ActionConcurrency>(r#"{"enable": true}"#).unwrap_err();
        assert!(err.to_string().contains("without v1"));

        let disabled: ActionConcurrency =
            serde_json::from_str(r#"{"enable": false, "v1": {"default": {"max": 1}}}"#).unwrap();
        assert_eq!(disabled, ActionConcurrency::Disabled);
    }

    #[test]
    fn test_wire_form_round_trip() {
        let json = serde_json::to_value(spec()).unwrap();
        assert_eq!(json["enable"], true);
        assert_eq!(json["v1"]["clusters"]["prod"]["max"], 1);
    }

    #[test]
    fn test_limiter() {
        let limiter = ActionConcurrencyLimiter::new();
        let spec = spec();

        assert!(limiter.try_acquire("deploy", "prod", &spec));
        assert!(!limiter.try_acquire("deploy", "prod", &spec));
        assert!(limiter.try_acquire("deploy", "dev", &spec));
        assert!(limiter.try_acquire("deploy", "dev", &spec));
        assert!(!limiter.try_acquire("deploy", "dev", &spec));

        limiter.release("deploy", "prod");
        assert_eq!(limiter.running("deploy", "prod"), 0);
        assert!(limiter.try_acquire("deploy", "prod", &spec));

        for _ in 0..10 {
            assert!(limiter.try_acquire("build", "prod", &ActionConcurrency::Disabled));
        }
        assert_eq!(limiter.running("build", "prod"), 10);
    }
}
