//! Invalidation dispatch for mutation hooks.
//!
//! Depending on [`InvalidationMode`], invalidations run inline or are queued and
//! consumed on a spawned task so the caller does not wait for them.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::{CacheConfig, InvalidationMode};
use super::consumer::{ConsumeReport, InvalidationConsumer};
use super::events::EventQueue;
use super::invalidation::{CacheError, InvalidationHelper, InvalidationRequest, QueryInvalidator};

pub struct InvalidationTrigger {
    config: CacheConfig,
    helper: InvalidationHelper,
    queue: Arc<EventQueue>,
    consumer: Arc<InvalidationConsumer>,
}

impl InvalidationTrigger {
    pub fn new(config: CacheConfig, invalidator: Arc<dyn QueryInvalidator>) -> Self {
        let helper = InvalidationHelper::new(invalidator);
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(InvalidationConsumer::new(
            config.clone(),
            queue.clone(),
            helper.clone(),
        ));
        Self {
            config,
            helper,
            queue,
            consumer,
        }
    }

    /// Hand `requests` to the cache according to the configured mode.
    ///
    /// In await mode the first failure is returned. In deferred mode failures
    /// are only logged by the consumer.
    pub async fn dispatch(&self, requests: &[InvalidationRequest]) -> Result<(), CacheError> {
        if !self.config.is_enabled() {
            debug!(
                category = "cache",
                request_count = requests.len(),
                "Invalidation skipped: cache disabled"
            );
            return Ok(());
        }
        if requests.is_empty() {
            return Ok(());
        }

        match self.config.invalidation_mode {
            InvalidationMode::Await => {
                for request in requests {
                    self.helper.invalidate(request).await?;
                }
            }
            InvalidationMode::Deferred => {
                for request in requests {
                    self.queue.publish(request.clone());
                }
                let consumer = self.consumer.clone();
                tokio::spawn(async move {
                    consumer.consume_all().await;
                });
            }
        }
        Ok(())
    }

    /// Consume everything still queued, waiting for completion.
    pub async fn flush(&self) -> ConsumeReport {
        self.consumer.consume_all().await
    }

    /// Periodically sweep the queue until the handle is aborted.
    pub fn spawn_auto_consume(&self) -> JoinHandle<()> {
        let consumer = self.consumer.clone();
        let period = self.config.auto_consume_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let report = consumer.consume_all().await;
                if report.failed > 0 {
                    warn!(
                        category = "cache",
                        failed = report.failed,
                        "Auto-consume left failed invalidations"
                    );
                }
            }
        })
    }

    pub fn helper(&self) -> &InvalidationHelper {
        &self.helper
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}
