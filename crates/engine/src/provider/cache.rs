//! In-process query cache.
//!
//! Holds completed payloads keyed by [`CacheKey`] with a freshness window, and at most one
//! in-flight request per key. Providers needing a key that is already being fetched subscribe
//! to that request instead of issuing another one. Requests run as tokio tasks and report back
//! over a channel drained by the manager; a request whose last subscriber leaves is aborted and
//! whatever it still delivers is discarded.

use std::{
    collections::HashMap,
    fmt,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde_json::Value;
use strata_types::NodeId;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{CacheKey, DataProviderType, FetchRequest};

pub(crate) type FetchOutcome = Result<(Arc<Value>, DateTime<Utc>), String>;

/// A node waiting on a request, pinned to the generation it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Subscriber {
    pub node_id: NodeId,
    pub instance: u64,
    pub generation: u64,
}

#[derive(Debug)]
pub(crate) struct FetchCompletion {
    cache_key: CacheKey,
    request_id: u64,
    from_cache: bool,
    outcome: FetchOutcome,
}

/// A completion matched to its live request.
#[derive(Debug)]
pub(crate) struct SettledFetch {
    pub cache_key: CacheKey,
    pub subscribers: Vec<Subscriber>,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchStart {
    /// A new request was spawned.
    Dispatched,
    /// Another node's request for the same key is already in flight.
    Joined,
    /// A fresh payload was cached; it is delivered through the completion channel.
    CacheHit,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Arc<Value>,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
    stale_time: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.stale_time
    }
}

struct InFlightRequest {
    request_id: u64,
    subscribers: Vec<Subscriber>,
    stale_time: Duration,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct QueryCache {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlightRequest>,
    default_stale_time: Duration,
    next_request_id: u64,
    dispatched: u64,
    /// Runtime fetch tasks are spawned on, captured at construction.
    runtime: Handle,
    sender: mpsc::UnboundedSender<FetchCompletion>,
    receiver: mpsc::UnboundedReceiver<FetchCompletion>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.entries.len())
            .field("in_flight", &self.in_flight.len())
            .field("default_stale_time", &self.default_stale_time)
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

impl QueryCache {
    pub fn new(default_stale_time: Duration, runtime: Handle) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            default_stale_time,
            next_request_id: 0,
            dispatched: 0,
            runtime,
            sender,
            receiver,
        }
    }

    fn lookup_fresh(&self, cache_key: &CacheKey) -> Option<(Arc<Value>, DateTime<Utc>)> {
        let entry = self.entries.get(cache_key)?;
        entry.is_fresh().then(|| (Arc::clone(&entry.data), entry.fetched_at_utc))
    }

    /// Subscribes `subscriber` to the payload for the request's cache key, dispatching a fetch
    /// only when no fresh entry and no in-flight request exist.
    pub fn begin(&mut self, request: FetchRequest, provider: Arc<dyn DataProviderType>, subscriber: Subscriber) -> FetchStart {
        let cache_key = request.cache_key.clone();
        if let Some(in_flight) = self.in_flight.get_mut(&cache_key) {
            debug!(cache_key = %cache_key, node_id = %subscriber.node_id, "joined in-flight request");
            in_flight.subscribers.push(subscriber);
            return FetchStart::Joined;
        }

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let stale_time = provider.stale_time().unwrap_or(self.default_stale_time);

        if let Some(hit) = self.lookup_fresh(&cache_key) {
            debug!(cache_key = %cache_key, node_id = %subscriber.node_id, "cache hit");
            self.in_flight.insert(
                cache_key.clone(),
                InFlightRequest {
                    request_id,
                    subscribers: vec![subscriber],
                    stale_time,
                    handle: None,
                },
            );
            let _ = self.sender.send(FetchCompletion {
                cache_key,
                request_id,
                from_cache: true,
                outcome: Ok(hit),
            });
            return FetchStart::CacheHit;
        }

        debug!(cache_key = %cache_key, node_id = %subscriber.node_id, "cache miss, dispatching fetch");
        let sender = self.sender.clone();
        let task_key = cache_key.clone();
        let handle = self.runtime.spawn(async move {
            let outcome = match AssertUnwindSafe(provider.fetch_data(request)).catch_unwind().await {
                Ok(Ok(data)) => Ok((Arc::new(data), Utc::now())),
                Ok(Err(error)) => Err(format!("{error:#}")),
                Err(_) => Err("fetch panicked".to_string()),
            };
            let _ = sender.send(FetchCompletion {
                cache_key: task_key,
                request_id,
                from_cache: false,
                outcome,
            });
        });
        self.dispatched += 1;
        self.in_flight.insert(
            cache_key,
            InFlightRequest {
                request_id,
                subscribers: vec![subscriber],
                stale_time,
                handle: Some(handle),
            },
        );
        FetchStart::Dispatched
    }

    /// Removes a node from a request's subscribers. Aborts the request when nobody is left and
    /// returns true in that case.
    pub fn leave(&mut self, cache_key: &CacheKey, node_id: &NodeId, instance: u64) -> bool {
        let Some(in_flight) = self.in_flight.get_mut(cache_key) else {
            return false;
        };
        in_flight
            .subscribers
            .retain(|subscriber| !(&subscriber.node_id == node_id && subscriber.instance == instance));
        if !in_flight.subscribers.is_empty() {
            return false;
        }
        if let Some(cancelled) = self.in_flight.remove(cache_key) {
            if let Some(handle) = cancelled.handle {
                handle.abort();
            }
            debug!(cache_key = %cache_key, request_id = cancelled.request_id, "request cancelled");
        }
        true
    }

    /// Matches a completion to its live request and records successful payloads.
    ///
    /// Completions of cancelled or superseded requests yield `None`.
    pub fn settle(&mut self, completion: FetchCompletion) -> Option<SettledFetch> {
        let live = self
            .in_flight
            .get(&completion.cache_key)
            .is_some_and(|in_flight| in_flight.request_id == completion.request_id);
        if !live {
            debug!(
                cache_key = %completion.cache_key,
                request_id = completion.request_id,
                "discarding completion of cancelled request"
            );
            return None;
        }
        let in_flight = self.in_flight.remove(&completion.cache_key)?;

        match &completion.outcome {
            Ok((data, fetched_at)) if !completion.from_cache => {
                info!(cache_key = %completion.cache_key, subscribers = in_flight.subscribers.len(), "fetch completed");
                self.entries.insert(
                    completion.cache_key.clone(),
                    CacheEntry {
                        data: Arc::clone(data),
                        fetched_at: Instant::now(),
                        fetched_at_utc: *fetched_at,
                        stale_time: in_flight.stale_time,
                    },
                );
            }
            Ok(_) => {}
            Err(message) => warn!(cache_key = %completion.cache_key, "fetch failed: {message}"),
        }

        Some(SettledFetch {
            cache_key: completion.cache_key,
            subscribers: in_flight.subscribers,
            outcome: completion.outcome,
        })
    }

    pub fn try_next_completion(&mut self) -> Option<FetchCompletion> {
        self.receiver.try_recv().ok()
    }

    /// Waits for the next completion; `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<FetchCompletion> {
        if let Ok(completion) = self.receiver.try_recv() {
            return Some(completion);
        }
        if self.in_flight.is_empty() {
            return None;
        }
        self.receiver.recv().await
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Drops entries past their freshness window.
    pub fn prune_stale(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh());
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!(pruned, "pruned stale cache entries");
        }
    }

    /// Drops every cached payload; in-flight requests are left alone.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of requests actually dispatched to provider fetch functions.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

impl Drop for QueryCache {
    fn drop(&mut self) {
        for in_flight in self.in_flight.values_mut() {
            if let Some(handle) = in_flight.handle.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FetchKey;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataProviderType for CountingProvider {
        fn settings(&self) -> &[&'static str] {
            &[]
        }

        async fn fetch_data(&self, request: FetchRequest) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "key": request.cache_key.to_string() }))
        }
    }

    #[derive(Debug)]
    struct PanickingProvider;

    #[async_trait]
    impl DataProviderType for PanickingProvider {
        fn settings(&self) -> &[&'static str] {
            &[]
        }

        async fn fetch_data(&self, _request: FetchRequest) -> anyhow::Result<Value> {
            panic!("malformed payload");
        }
    }

    fn cache(stale_time: Duration) -> QueryCache {
        QueryCache::new(stale_time, Handle::current())
    }

    fn request(value: &str) -> FetchRequest {
        FetchRequest {
            cache_key: CacheKey::new("surface", FetchKey::from_canonical(value)),
            settings: IndexMap::new(),
        }
    }

    fn subscriber(node: &str) -> Subscriber {
        Subscriber {
            node_id: NodeId::from(node),
            instance: 1,
            generation: 1,
        }
    }

    #[tokio::test]
    async fn second_subscriber_joins_in_flight_request() {
        let provider = Arc::new(CountingProvider::default());
        let mut cache = cache(Duration::from_secs(60));

        assert_eq!(cache.begin(request("a"), provider.clone(), subscriber("p1")), FetchStart::Dispatched);
        assert_eq!(cache.begin(request("a"), provider.clone(), subscriber("p2")), FetchStart::Joined);

        let completion = cache.next_completion().await.expect("completion");
        let settled = cache.settle(completion).expect("live request");
        assert_eq!(settled.subscribers.len(), 2);
        assert!(settled.outcome.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.dispatched(), 1);

        assert_eq!(cache.begin(request("a"), provider.clone(), subscriber("p3")), FetchStart::CacheHit);
        let hit = cache.next_completion().await.expect("cache hit completion");
        assert!(cache.settle(hit).is_some());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_entries_are_refetched() {
        let provider = Arc::new(CountingProvider::default());
        let mut cache = cache(Duration::ZERO);

        cache.begin(request("a"), provider.clone(), subscriber("p1"));
        let completion = cache.next_completion().await.expect("completion");
        cache.settle(completion);

        assert_eq!(cache.begin(request("a"), provider.clone(), subscriber("p1")), FetchStart::Dispatched);
        let completion = cache.next_completion().await.expect("completion");
        cache.settle(completion);
        assert_eq!(cache.dispatched(), 2);
    }

    #[tokio::test]
    async fn completion_after_last_subscriber_left_is_discarded() {
        let provider = Arc::new(CountingProvider::default());
        let mut cache = cache(Duration::from_secs(60));

        cache.begin(request("a"), provider.clone(), subscriber("p1"));
        cache.begin(request("a"), provider.clone(), subscriber("p2"));
        assert!(!cache.leave(&request("a").cache_key, &NodeId::from("p1"), 1));
        assert!(cache.leave(&request("a").cache_key, &NodeId::from("p2"), 1));
        assert!(!cache.has_in_flight());
        assert!(cache.next_completion().await.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_fetch_settles_as_an_error() {
        let mut cache = cache(Duration::from_secs(60));
        cache.begin(request("a"), Arc::new(PanickingProvider), subscriber("p1"));

        let completion = cache.next_completion().await.expect("completion");
        let settled = cache.settle(completion).expect("live request");
        assert_eq!(settled.outcome, Err("fetch panicked".to_string()));
        assert!(cache.lookup_fresh(&request("a").cache_key).is_none());
    }

    #[tokio::test]
    async fn superseded_request_completion_is_ignored() {
        let provider = Arc::new(CountingProvider::default());
        let mut cache = cache(Duration::from_secs(60));

        cache.begin(request("a"), provider.clone(), subscriber("p1"));
        cache.leave(&request("a").cache_key, &NodeId::from("p1"), 1);
        cache.begin(request("a"), provider.clone(), subscriber("p1"));

        let mut applied = 0;
        while cache.has_in_flight() {
            let completion = cache.next_completion().await.expect("completion");
            if cache.settle(completion).is_some() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }
}
