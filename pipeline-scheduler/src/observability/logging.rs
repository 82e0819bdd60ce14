//! Subscriber installation and span helpers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info_span, Span};
use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::UnknownEnumValue;
use crate::pipeline::PipelineRecord;
use crate::queue::PipelineQueue;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Plain,
    /// One JSON object per line.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = UnknownEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => Err(UnknownEnumValue::new("log format", s)),
        }
    }
}

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `default_directive`.
/// Fails if the directive is invalid or a subscriber is already set.
pub fn init_tracing(format: LogFormat, default_directive: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| anyhow::anyhow!("invalid log directive {default_directive:?}: {e}"))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Plain => registry
            .with(tracing_fmt::layer().with_target(false))
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_fmt::layer().json().with_current_span(true))
            .try_init()?,
    }
    Ok(())
}

/// Span carrying the attributes of a pipeline.
#[must_use]
pub fn pipeline_span(record: &PipelineRecord) -> Span {
    info_span!(
        "pipeline",
        pipeline.id = record.id,
        pipeline.source = %record.source,
        pipeline.yml_name = %record.yml_name,
        pipeline.cluster = %record.cluster_name,
        pipeline.status = %record.status,
        queue.id = record.queue.as_ref().map(|binding| binding.queue_id),
    )
}

/// Span carrying the attributes of a queue.
#[must_use]
pub fn queue_span(queue: &PipelineQueue) -> Span {
    info_span!(
        "queue",
        queue.id = queue.id,
        queue.name = %queue.name,
        queue.source = %queue.pipeline_source,
        queue.mode = %queue.mode,
    )
}
