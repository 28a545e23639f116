//! In-process query cache.
//!
//! `QueryClient` is the read side of the cache: query hooks fetch through it,
//! and the invalidation layer reaches it only through [`QueryInvalidator`].

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::presentation::query_state::QueryFlags;

use super::config::CacheConfig;
use super::invalidation::{CacheError, QueryInvalidator};
use super::keys::{DataType, QueryKey};
use super::lock::mutex_lock;
use super::store::QueryStore;

const SOURCE: &str = "cache::client";
const EVENT_CHANNEL_CAPACITY: usize = 64;

const METRIC_QUERY_HIT: &str = "nutrio_query_cache_hit_total";
const METRIC_QUERY_MISS: &str = "nutrio_query_cache_miss_total";
const METRIC_QUERY_EVICT: &str = "nutrio_query_cache_evict_total";
const METRIC_QUERY_INVALIDATED: &str = "nutrio_query_invalidated_total";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query {key} failed after {attempts} attempt(s): {message}")]
    Loader {
        key: QueryKey,
        attempts: u32,
        message: String,
    },
    #[error("failed to encode result of {key}: {source}")]
    Encode {
        key: QueryKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode cached result of {key}: {source}")]
    Decode {
        key: QueryKey,
        #[source]
        source: serde_json::Error,
    },
}

/// Notifications for cache observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    Fetched(QueryKey),
    Invalidated { prefix: QueryKey, marked: usize },
    Evicted(QueryKey),
}

/// Cached data plus the flags a view needs to pick what to render.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot<T> {
    pub data: Option<T>,
    pub flags: QueryFlags,
}

pub struct QueryClient {
    config: CacheConfig,
    store: QueryStore,
    in_flight: Mutex<HashMap<QueryKey, usize>>,
    events: broadcast::Sender<QueryEvent>,
}

impl QueryClient {
    pub fn new(config: CacheConfig) -> Self {
        let store = QueryStore::new(&config);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            store,
            in_flight: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.events.subscribe()
    }

    /// Return the cached value when fresh, otherwise load and cache it.
    ///
    /// The loader runs at most `1 + retry` times for the type's policy. With
    /// the cache disabled every call loads; the result is only kept for
    /// snapshots.
    pub async fn fetch_query<T, E, F, Fut>(
        &self,
        key: QueryKey,
        data_type: DataType,
        mut loader: F,
    ) -> Result<T, QueryError>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let policy = self.config.policy(data_type);
        let now = Instant::now();

        if self.config.is_enabled()
            && let Some(entry) = self.store.get(&key, now)
            && entry.is_fresh(now, policy.stale_time)
        {
            counter!(METRIC_QUERY_HIT, "data_type" => data_type.tag()).increment(1);
            return serde_json::from_value(entry.value)
                .map_err(|source| QueryError::Decode { key, source });
        }
        counter!(METRIC_QUERY_MISS, "data_type" => data_type.tag()).increment(1);

        let _fetching = InFlight::begin(self, &key);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match loader().await {
                Ok(value) => {
                    let json = serde_json::to_value(&value).map_err(|source| {
                        QueryError::Encode {
                            key: key.clone(),
                            source,
                        }
                    })?;
                    self.store_value(key, data_type, json);
                    return Ok(value);
                }
                Err(err) if attempts <= policy.retry => {
                    warn!(
                        category = "cache",
                        key = %key,
                        attempt = attempts,
                        error = %err,
                        "Query failed, retrying"
                    );
                }
                Err(err) => {
                    return Err(QueryError::Loader {
                        key,
                        attempts,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    pub fn get_query_data<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
    ) -> Result<Option<T>, QueryError> {
        let Some(entry) = self.store.peek(key) else {
            return Ok(None);
        };
        serde_json::from_value::<Option<T>>(entry.value).map_err(|source| QueryError::Decode {
            key: key.clone(),
            source,
        })
    }

    pub fn set_query_data<T: Serialize>(
        &self,
        key: QueryKey,
        data_type: DataType,
        value: &T,
    ) -> Result<(), QueryError> {
        let json = serde_json::to_value(value).map_err(|source| QueryError::Encode {
            key: key.clone(),
            source,
        })?;
        self.store_value(key, data_type, json);
        Ok(())
    }

    /// Current data and status flags for `key`.
    ///
    /// A key that was never fetched is pending. A fetched `null` is settled
    /// with no data.
    pub fn snapshot<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
    ) -> Result<QuerySnapshot<T>, QueryError> {
        let entry = self.store.peek(key);
        let fetching = self.is_fetching(key);
        let has_entry = entry.is_some();
        let data = match entry {
            Some(entry) => serde_json::from_value::<Option<T>>(entry.value).map_err(|source| {
                QueryError::Decode {
                    key: key.clone(),
                    source,
                }
            })?,
            None => None,
        };
        let flags = QueryFlags {
            is_loading: fetching && !has_entry,
            is_fetching: fetching,
            is_pending: !has_entry,
            is_refetching: fetching && has_entry,
            is_fetched_after_mount: has_entry,
        };
        Ok(QuerySnapshot { data, flags })
    }

    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.store.peek(key).map(|entry| entry.stale)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.in_flight, SOURCE, "is_fetching").contains_key(key)
    }

    /// Mark every entry under `prefix` stale and notify subscribers.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let marked = self.store.mark_stale(prefix);
        counter!(METRIC_QUERY_INVALIDATED).increment(marked as u64);
        debug!(category = "cache", prefix = %prefix, marked, "Query entries invalidated");
        let _ = self.events.send(QueryEvent::Invalidated {
            prefix: prefix.clone(),
            marked,
        });
        marked
    }

    /// Remove entries idle for longer than their type's `gc_time`.
    pub fn collect_garbage(&self, now: Instant) -> usize {
        let removed = self
            .store
            .evict_idle(now, |data_type| self.config.policy(data_type).gc_time);
        for key in &removed {
            let _ = self.events.send(QueryEvent::Evicted(key.clone()));
        }
        removed.len()
    }

    /// Sweep idle entries every `gc_interval` until the handle is aborted.
    pub fn spawn_garbage_collector(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        let period = self.config.gc_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = client.collect_garbage(Instant::now());
                if removed > 0 {
                    info!(category = "cache", removed, "Idle queries collected");
                }
            }
        })
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    fn store_value(&self, key: QueryKey, data_type: DataType, value: serde_json::Value) {
        if let Some(evicted) = self
            .store
            .put(key.clone(), data_type, value, Instant::now())
        {
            counter!(METRIC_QUERY_EVICT).increment(1);
            let _ = self.events.send(QueryEvent::Evicted(evicted));
        }
        let _ = self.events.send(QueryEvent::Fetched(key));
    }
}

#[async_trait]
impl QueryInvalidator for QueryClient {
    async fn invalidate_queries(&self, key: &QueryKey) -> Result<(), CacheError> {
        self.invalidate(key);
        Ok(())
    }
}

/// Marks a key as being fetched for the guard's lifetime.
struct InFlight<'a> {
    client: &'a QueryClient,
    key: QueryKey,
}

impl<'a> InFlight<'a> {
    fn begin(client: &'a QueryClient, key: &QueryKey) -> Self {
        *mutex_lock(&client.in_flight, SOURCE, "begin_fetch")
            .entry(key.clone())
            .or_insert(0) += 1;
        Self {
            client,
            key: key.clone(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = mutex_lock(&self.client.in_flight, SOURCE, "end_fetch");
        if let Some(count) = in_flight.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::cache::keys;

    fn client() -> QueryClient {
        QueryClient::new(CacheConfig::default())
    }

    async fn counted_fetch(client: &QueryClient, calls: &AtomicU32) -> u32 {
        client
            .fetch_query(keys::meal(1), DataType::Meal, || async move {
                Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_entries_are_served_from_cache() {
        let client = client();
        let calls = AtomicU32::new(0);

        assert_eq!(counted_fetch(&client, &calls).await, 1);
        assert_eq!(counted_fetch(&client, &calls).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_cache_always_runs_the_loader() {
        let client = QueryClient::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let calls = AtomicU32::new(0);

        assert_eq!(counted_fetch(&client, &calls).await, 1);
        assert_eq!(counted_fetch(&client, &calls).await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let snapshot = client.snapshot::<u32>(&keys::meal(1)).unwrap();
        assert_eq!(snapshot.data, Some(2));
    }

    #[tokio::test]
    async fn invalidated_entries_are_refetched() {
        let client = client();
        let calls = AtomicU32::new(0);
        counted_fetch(&client, &calls).await;

        assert_eq!(client.invalidate(&keys::meal(1)), 1);
        assert_eq!(client.is_stale(&keys::meal(1)), Some(true));

        assert_eq!(counted_fetch(&client, &calls).await, 2);
        assert_eq!(client.is_stale(&keys::meal(1)), Some(false));
    }

    #[tokio::test]
    async fn loader_is_retried_then_error_surfaces() {
        let client = client();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<u32, _> = client
            .fetch_query(keys::plan(1), DataType::Plan, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>("database offline")
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, QueryError::Loader { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!client.is_fetching(&keys::plan(1)));
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_retry_budget() {
        let client = client();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let value = client
            .fetch_query(keys::plans_list(), DataType::PlansList, || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("busy".to_string())
                } else {
                    Ok(vec![1, 2, 3])
                }
            })
            .await
            .unwrap();

        assert_eq!(value, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidation_notifies_subscribers() {
        let client = client();
        let mut events = client.subscribe();
        client
            .set_query_data(keys::plan(2), DataType::Plan, &"plan")
            .unwrap();
        assert_eq!(events.recv().await.unwrap(), QueryEvent::Fetched(keys::plan(2)));

        client.invalidate_queries(&keys::plan(2)).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            QueryEvent::Invalidated {
                prefix: keys::plan(2),
                marked: 1
            }
        );
    }

    #[test]
    fn snapshot_flags_follow_entry_state() {
        let client = client();

        let missing = client.snapshot::<String>(&keys::meal(3)).unwrap();
        assert!(missing.flags.is_pending);
        assert!(missing.data.is_none());

        client
            .set_query_data(keys::meal(3), DataType::Meal, &Option::<String>::None)
            .unwrap();
        let settled = client.snapshot::<String>(&keys::meal(3)).unwrap();
        assert!(!settled.flags.is_pending);
        assert!(settled.data.is_none());

        client
            .set_query_data(keys::meal(3), DataType::Meal, &"Oats")
            .unwrap();
        let ready = client.snapshot::<String>(&keys::meal(3)).unwrap();
        assert_eq!(ready.data.as_deref(), Some("Oats"));
        assert!(ready.flags.is_fetched_after_mount);
    }

    #[test]
    fn garbage_collection_uses_type_policy() {
        let client = client();
        client
            .set_query_data(keys::daily_progress(1), DataType::DailyProgress, &1)
            .unwrap();
        client.set_query_data(keys::meal(1), DataType::Meal, &1).unwrap();

        let removed = client.collect_garbage(Instant::now() + Duration::from_secs(10 * 60));

        assert_eq!(removed, 1);
        assert_eq!(client.keys(), vec![keys::meal(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_collector_keeps_fresh_entries_until_aborted() {
        let client = Arc::new(QueryClient::new(CacheConfig {
            gc_interval_ms: 1_000,
            ..CacheConfig::default()
        }));
        client.set_query_data(keys::meal(1), DataType::Meal, &1).unwrap();
        let handle = client.spawn_garbage_collector();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(client.keys(), vec![keys::meal(1)]);
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
