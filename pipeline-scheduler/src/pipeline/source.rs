//! Pipeline source.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::UnknownEnumValue;

/// The platform component a pipeline was created from.
///
/// Queues are namespaced by source: a pipeline can only bind a queue of its
/// own source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineSource {
    /// Created without a specific owner.
    Default,
    /// Application deployments.
    Dice,
    /// Big data workflows.
    Bigdata,
    /// Operations jobs.
    Ops,
    /// Quality analysis.
    Qa,
    /// Automated tests.
    Autotest,
    /// Project level pipelines.
    ProjectPipeline,
    /// Data platform jobs.
    Cdp,
    /// API tests.
    ApiTest,
}

impl PipelineSource {
    /// Every source.
    pub const ALL: [Self; 9] = [
        Self::Default,
        Self::Dice,
        Self::Bigdata,
        Self::Ops,
        Self::Qa,
        Self::Autotest,
        Self::ProjectPipeline,
        Self::Cdp,
        Self::ApiTest,
    ];

    /// Wire name of the source.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Dice => "dice",
            Self::Bigdata => "bigdata",
            Self::Ops => "ops",
            Self::Qa => "qa",
            Self::Autotest => "autotest",
            Self::ProjectPipeline => "project-pipeline",
            Self::Cdp => "cdp",
            Self::ApiTest => "api-test",
        }
    }
}

impl Default for PipelineSource {
    fn default() -> Self {
        Self::Default
    }
}

impl fmt::Display for PipelineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineSource {
    type Err = UnknownEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| UnknownEnumValue::new("pipeline source", s))
    }
}
