//! Background GC task.
//!
//! Periodically sweeps the pipeline store until shut down.

use anyhow::ensure;
use std::sync::Arc;
use tracing::info;

use super::{GcReport, GcSweeper};
use crate::pipeline::CancelSignal;
use crate::utils::now_utc;

/// Runs a [`GcSweeper`] on the configured interval.
pub struct GcTask {
    sweeper: Arc<GcSweeper>,
}

impl GcTask {
    /// Creates a task around `sweeper`.
    #[must_use]
    pub fn new(sweeper: Arc<GcSweeper>) -> Self {
        Self { sweeper }
    }

    /// Sweeps until `shutdown` fires, returning the accumulated totals.
    pub async fn run(self, shutdown: Arc<CancelSignal>) -> anyhow::Result<GcReport> {
        let config = self.sweeper.config();
        ensure!(config.batch_size > 0, "gc batch size must be positive");

        let interval = config.sweep_interval();
        info!(
            interval_secs = interval.as_secs(),
            batch_size = config.batch_size,
            "GC task started"
        );

        let mut total = GcReport::default();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!(reason = ?shutdown.reason(), "GC task shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {
                    total.merge(self.sweeper.sweep_once(now_utc()).await);
                }
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::gc::{InMemoryArchiveStore, LoggingReclaimer};
    use crate::pipeline::{PipelineRecord, PipelineSource, PipelineStore};
    use crate::status::PipelineStatus;
    use std::time::Duration;

    fn task(store: &Arc<PipelineStore>, config: GcConfig) -> GcTask {
        GcTask::new(Arc::new(GcSweeper::new(
            Arc::clone(store),
            Arc::new(LoggingReclaimer),
            Arc::new(InMemoryArchiveStore::new()),
            config,
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_sweeps_until_shutdown() {
        let store = Arc::new(PipelineStore::new());
        let mut record =
            PipelineRecord::new(1, PipelineSource::Default, "p.yml", "dev", now_utc());
        record.status = PipelineStatus::Success;
        record.ended_at = Some(now_utc());
        record.gc.resource_gc.success_ttl_second = Some(0);
        store.insert(record);

        let config = GcConfig::default().with_sweep_interval(Duration::from_secs(10));
        let shutdown = CancelSignal::shared();
        let handle = tokio::spawn(task(&store, config).run(Arc::clone(&shutdown)));

        tokio::time::sleep(Duration::from_secs(25)).await;
        shutdown.cancel("test finished");

        let total = handle.await.unwrap().unwrap();
        assert_eq!(total.resources_released, 1);
        assert!(total.examined >= 2);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let store = Arc::new(PipelineStore::new());
        let shutdown = CancelSignal::shared();
        let result = task(&store, GcConfig::default().with_batch_size(0))
            .run(shutdown)
            .await;
        assert!(result.is_err());
    }
}
