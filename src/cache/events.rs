//! Queue of pending invalidations for deferred dispatch.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::invalidation::InvalidationRequest;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_QUEUE_LEN: &str = "nutrio_invalidation_queue_len";

/// Monotonic publish order within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Idempotency key; replays of the same event are merged.
    pub id: Uuid,
    pub epoch: Epoch,
    pub request: InvalidationRequest,
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(request: InvalidationRequest, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            request,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// In-memory FIFO of invalidation events.
pub struct EventQueue {
    queue: Mutex<VecDeque<InvalidationEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, request: InvalidationRequest) -> Uuid {
        let event = InvalidationEvent::new(request, self.next_epoch());
        let id = event.id;

        info!(
            category = "cache",
            event_id = %event.id,
            event_epoch = event.epoch,
            data_type = %event.request.data_type,
            related = event.request.invalidate_related,
            "Invalidation event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        id
    }

    /// Drain up to `limit` events in FIFO order. A zero limit drains one.
    pub fn drain(&self, limit: usize) -> Vec<InvalidationEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.max(1).min(queue.len());
        let drained = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::cache::invalidation::InvalidationScope;
    use crate::cache::keys::DataType;

    fn request(data_type: DataType, id: i64) -> InvalidationRequest {
        InvalidationRequest::new(data_type, InvalidationScope::id(id))
    }

    #[test]
    fn epochs_increase() {
        let queue = EventQueue::new();
        let first = queue.next_epoch();
        assert!(first < queue.next_epoch());
    }

    #[test]
    fn drain_is_fifo_and_bounded() {
        let queue = EventQueue::new();
        queue.publish(request(DataType::Plan, 1));
        queue.publish(request(DataType::Meal, 2));
        queue.publish(request(DataType::DailyProgress, 3));

        let events = queue.drain(2);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].request.data_type, DataType::Plan);
        assert_eq!(events[1].request.data_type, DataType::Meal);
        assert!(events[0].epoch < events[1].epoch);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(100).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_limit_still_drains_one_event() {
        let queue = EventQueue::new();
        queue.publish(request(DataType::Plan, 1));
        queue.publish(request(DataType::Meal, 2));

        assert_eq!(queue.drain(0).len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn queue_recovers_from_poisoned_lock() {
        let queue = EventQueue::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = queue.queue.lock().expect("queue lock should be acquired");
            panic!("poison queue lock");
        }));

        queue.publish(request(DataType::Plan, 1));
        assert_eq!(queue.len(), 1);
    }
}
