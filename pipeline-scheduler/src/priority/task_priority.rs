//! Queue and priority rules of a pipeline.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::queue::{PIPELINE_QUEUE_DEFAULT_CONCURRENCY, PIPELINE_QUEUE_DEFAULT_PRIORITY};

/// One priority rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRule {
    /// Queue the rule targets.
    pub queue: String,
    /// Concurrency granted by the rule.
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,
    /// Priority granted by the rule.
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_concurrency() -> i64 {
    i64::try_from(PIPELINE_QUEUE_DEFAULT_CONCURRENCY).unwrap_or(1)
}

fn default_priority() -> i64 {
    PIPELINE_QUEUE_DEFAULT_PRIORITY
}

/// Ordered priority rules, resolved at load time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTaskPriority", into = "RawTaskPriority")]
pub enum PipelineTaskPriority {
    /// Rules never apply.
    #[default]
    Disabled,
    /// Rules in declaration order.
    V1(Vec<PriorityRule>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawTaskPriority {
    #[serde(default)]
    enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v1: Option<Vec<PriorityRule>>,
}

impl TryFrom<RawTaskPriority> for PipelineTaskPriority {
    type Error = ValidationError;

    fn try_from(raw: RawTaskPriority) -> Result<Self, Self::Error> {
        match (raw.enable, raw.v1) {
            (false, _) => Ok(Self::Disabled),
            (true, Some(rules)) => Ok(Self::V1(rules)),
            (true, None) => {
                Err(ValidationError::new("task priority enabled without v1 rules").with_field("v1"))
            }
        }
    }
}

impl From<PipelineTaskPriority> for RawTaskPriority {
    fn from(value: PipelineTaskPriority) -> Self {
        match value {
            PipelineTaskPriority::Disabled => Self::default(),
            PipelineTaskPriority::V1(rules) => Self {
                enable: true,
                v1: Some(rules),
            },
        }
    }
}

/// Outcome of [`resolve_priority`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPriority {
    /// Matched queue, if a rule applied.
    pub queue: Option<String>,
    /// Concurrency to use.
    pub concurrency: i64,
    /// Priority to use.
    pub priority: i64,
}

impl Default for ResolvedPriority {
    fn default() -> Self {
        Self {
            queue: None,
            concurrency: default_concurrency(),
            priority: default_priority(),
        }
    }
}

/// Picks the first rule whose queue is available.
///
/// Falls back to the package defaults when the rules are disabled or none
/// of them matches.
#[must_use]
pub fn resolve_priority<S: AsRef<str>>(
    spec: &PipelineTaskPriority,
    available_queues: &[S],
) -> ResolvedPriority {
    let PipelineTaskPriority::V1(rules) = spec else {
        return ResolvedPriority::default();
    };

    rules
        .iter()
        .find(|rule| available_queues.iter().any(|q| q.as_ref() == rule.queue))
        .map_or_else(ResolvedPriority::default, |rule| ResolvedPriority {
            queue: Some(rule.queue.clone()),
            concurrency: rule.concurrency,
            priority: rule.priority,
        })
}
