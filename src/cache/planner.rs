//! Merges queued invalidation events into a minimal set of keys.

use std::collections::HashSet;
use std::fmt;

use super::events::InvalidationEvent;
use super::keys::QueryKey;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Keys in first-published order. No key is a prefix of another.
    pub keys: Vec<QueryKey>,
    /// Events merged into this plan after removing replays.
    pub event_count: usize,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ events: {}, keys: {} }}",
            self.event_count,
            self.keys.len()
        )
    }
}

impl InvalidationPlan {
    /// - Deduplicates events by id
    /// - Orders them by epoch
    /// - Expands each request and drops keys already covered by a shorter one
    pub fn from_events(events: Vec<InvalidationEvent>) -> Self {
        let mut seen_ids = HashSet::new();
        let mut events: Vec<_> = events
            .into_iter()
            .filter(|event| seen_ids.insert(event.id))
            .collect();
        events.sort_by_key(|event| event.epoch);

        let mut expanded: Vec<QueryKey> = Vec::new();
        for event in &events {
            for key in event.request.keys() {
                if !expanded.contains(&key) {
                    expanded.push(key);
                }
            }
        }

        let keys = expanded
            .iter()
            .filter(|key| {
                !expanded
                    .iter()
                    .any(|other| other.len() < key.len() && other.is_prefix_of(key))
            })
            .cloned()
            .collect();

        Self {
            keys,
            event_count: events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::cache::invalidation::{InvalidationRequest, InvalidationScope};
    use crate::cache::keys::{self, DataType};
    use crate::domain::types::MealSlot;

    fn event(request: InvalidationRequest, epoch: u64) -> InvalidationEvent {
        InvalidationEvent::new(request, epoch)
    }

    #[test]
    fn replayed_events_are_counted_once() {
        let first = event(
            InvalidationRequest::new(DataType::DailyProgress, InvalidationScope::id(7)),
            0,
        );
        let plan = InvalidationPlan::from_events(vec![first.clone(), first]);

        assert_eq!(plan.event_count, 1);
        assert_eq!(plan.keys, vec![keys::daily_progress(7)]);
    }

    #[test]
    fn shared_dependents_are_deduplicated() {
        let day = date!(2024 - 01 - 01);
        let scope = InvalidationScope::id(1)
            .with_date(day)
            .with_slot(MealSlot::Lunch);
        let plan = InvalidationPlan::from_events(vec![
            event(InvalidationRequest::new(DataType::Plan, scope).related(), 0),
            event(InvalidationRequest::new(DataType::Plan, scope).related(), 1),
        ]);

        assert_eq!(plan.event_count, 2);
        assert_eq!(plan.keys.len(), 4);
    }

    #[test]
    fn narrower_keys_collapse_into_covering_prefix() {
        let day = date!(2024 - 01 - 01);
        let narrow = InvalidationScope::id(1)
            .with_date(day)
            .with_slot(MealSlot::Dinner);
        let plan = InvalidationPlan::from_events(vec![
            event(InvalidationRequest::new(DataType::Plan, narrow).related(), 0),
            event(
                InvalidationRequest::new(DataType::Plan, InvalidationScope::all()),
                1,
            ),
        ]);

        // ["plan"] covers ["plan", 1]; the other types keep their own keys.
        assert!(!plan.keys.contains(&keys::plan(1)));
        assert!(plan.keys.contains(&QueryKey::tag_of(DataType::Plan)));
        assert!(plan.keys.contains(&keys::daily_nutrition(1, day)));
        assert_eq!(plan.keys.len(), 4);
    }

    #[test]
    fn empty_input_gives_empty_plan() {
        let plan = InvalidationPlan::from_events(Vec::new());
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "InvalidationPlan { events: 0, keys: 0 }");
    }
}
