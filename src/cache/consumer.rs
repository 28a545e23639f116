//! Drains queued invalidations and applies them to the query cache.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::invalidation::InvalidationHelper;
use super::planner::InvalidationPlan;

const METRIC_CONSUME_MS: &str = "nutrio_invalidation_consume_ms";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    pub events: usize,
    pub invalidated: usize,
    pub failed: usize,
}

impl ConsumeReport {
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

pub struct InvalidationConsumer {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    helper: InvalidationHelper,
}

impl InvalidationConsumer {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, helper: InvalidationHelper) -> Self {
        Self {
            config,
            queue,
            helper,
        }
    }

    /// Consume one batch of pending events.
    ///
    /// A failing key is logged and skipped; the rest of the plan still runs.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> ConsumeReport {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit.max(1));
        if events.is_empty() {
            return ConsumeReport::default();
        }

        let event_ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            category = "cache",
            event_count = event_ids.len(),
            event_ids = ?event_ids,
            plan = %plan,
            "Invalidation consumption starting"
        );

        let mut report = ConsumeReport {
            events: plan.event_count,
            ..ConsumeReport::default()
        };
        for key in &plan.keys {
            match self.helper.invalidate_key(key).await {
                Ok(()) => report.invalidated += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        category = "cache",
                        key = %key,
                        error = %err,
                        "Deferred invalidation failed"
                    );
                }
            }
        }

        info!(
            category = "cache",
            invalidated = report.invalidated,
            failed = report.failed,
            "Invalidation consumption complete"
        );
        histogram!(METRIC_CONSUME_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        report
    }

    /// Consume batches until the queue is empty.
    pub async fn consume_all(&self) -> ConsumeReport {
        let mut total = ConsumeReport::default();
        loop {
            let report = self.consume().await;
            if report.is_empty() {
                return total;
            }
            total.events += report.events;
            total.invalidated += report.invalidated;
            total.failed += report.failed;
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}
