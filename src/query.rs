//! Keyed query cache with subscriptions, fetch de-duplication, and
//! invalidation.
//!
//! The cache holds one entry per [`QueryKey`]: the last fetched collection,
//! the current status, and the listeners that want to hear about changes.
//! All fetching funnels through [`QueryCache::ensure_fetched`], which
//! guarantees at most one outstanding fetch per key. Writers call
//! [`QueryCache::invalidate`] after a mutation; subscribed entries refetch
//! immediately, and an invalidation that races an in-flight fetch queues a
//! second fetch rather than being dropped, so the cache always catches up
//! with the mutation.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::new();
//! let key = QueryKey::comments("ceda");
//!
//! let _sub = cache.subscribe(&key, |entry| {
//!     // re-render from the snapshot
//! });
//!
//! let client = client.clone();
//! cache.ensure_fetched(&key, move || {
//!     let client = client.clone();
//!     async move { client.fetch_comments("ceda").await.map(Records::Comments) }
//! });
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tracing::debug;

use crate::board::keys::{KeySelector, QueryKey};
use crate::board::types::Records;
use crate::error::ApiError;

/// The lifecycle of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Nothing has been fetched for this key yet
  Idle,
  /// A fetch is underway
  Loading,
  /// The last fetch completed with data
  Success,
  /// The last fetch failed
  Error,
}

/// Snapshot of one cache entry, as handed to `read()` callers and listeners.
#[derive(Debug, Clone)]
pub struct QueryEntry {
  pub key: QueryKey,
  pub status: QueryStatus,
  /// Present iff the key has ever fetched successfully
  pub data: Option<Records>,
  /// Present iff the most recent fetch failed
  pub error: Option<ApiError>,
  /// Data is outdated: an invalidation landed, or a refetch failed and the
  /// last good collection was kept
  pub stale: bool,
  /// Count of settled fetches (success or error) for this key. Poll-model
  /// consumers compare generations to detect completion.
  pub generation: u64,
  pub subscriber_count: usize,
}

impl QueryEntry {
  fn idle(key: QueryKey) -> Self {
    Self {
      key,
      status: QueryStatus::Idle,
      data: None,
      error: None,
      stale: false,
      generation: 0,
      subscriber_count: 0,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }
}

/// A factory producing one fetch attempt per call. Remembered per key so an
/// invalidation can refetch without the original caller present.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Records, ApiError>> + Send + Sync>;

type Listener = Arc<dyn Fn(&QueryEntry) + Send + Sync>;

struct EntryState {
  status: QueryStatus,
  data: Option<Records>,
  error: Option<ApiError>,
  stale: bool,
  generation: u64,
  listeners: HashMap<u64, Listener>,
  fetcher: Option<Fetcher>,
}

impl EntryState {
  fn new() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      stale: false,
      generation: 0,
      listeners: HashMap::new(),
      fetcher: None,
    }
  }

  fn snapshot(&self, key: &QueryKey) -> QueryEntry {
    QueryEntry {
      key: key.clone(),
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      stale: self.stale,
      generation: self.generation,
      subscriber_count: self.listeners.len(),
    }
  }

  /// Pair every listener with the given snapshot for invocation after the
  /// lock is released.
  fn notifications(&self, snapshot: &QueryEntry) -> Vec<(Listener, QueryEntry)> {
    self
      .listeners
      .values()
      .map(|l| (Arc::clone(l), snapshot.clone()))
      .collect()
  }
}

struct CacheState {
  entries: HashMap<QueryKey, EntryState>,
  /// Keys with an outstanding fetch, tracked beside the entries so
  /// de-duplication can be checked before an entry even exists
  in_flight: HashSet<QueryKey>,
  /// Keys invalidated while in flight: a second fetch starts when the
  /// current one settles
  queued: HashSet<QueryKey>,
  next_listener_id: u64,
}

/// Process-scoped query cache. Constructed explicitly at application start
/// and handed by clone (shared state) to every dependent; tests build a
/// fresh one per run.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Mutex<CacheState>>,
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

impl QueryCache {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(CacheState {
        entries: HashMap::new(),
        in_flight: HashSet::new(),
        queued: HashSet::new(),
        next_listener_id: 0,
      })),
    }
  }

  // Critical sections never await and never panic; if one did, the state it
  // guards is still consistent, so recover rather than propagate poisoning.
  fn lock(inner: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Snapshot the current entry for a key. Unknown keys read as idle.
  pub fn read(&self, key: &QueryKey) -> QueryEntry {
    let state = Self::lock(&self.inner);
    match state.entries.get(key) {
      Some(entry) => entry.snapshot(key),
      None => QueryEntry::idle(key.clone()),
    }
  }

  /// Register a listener for a key. The listener runs (outside the cache
  /// lock) on every status transition. Dropping the returned
  /// [`Subscription`] unregisters it.
  ///
  /// Subscribing to a stale entry re-triggers its fetch, which is how
  /// entries invalidated without subscribers catch up lazily.
  pub fn subscribe<F>(&self, key: &QueryKey, listener: F) -> Subscription
  where
    F: Fn(&QueryEntry) + Send + Sync + 'static,
  {
    let (id, notify, start) = {
      let mut guard = Self::lock(&self.inner);
      let state = &mut *guard;
      let id = state.next_listener_id;
      state.next_listener_id += 1;

      let entry = state.entries.entry(key.clone()).or_insert_with(EntryState::new);
      entry.listeners.insert(id, Arc::new(listener));

      // Lazy refetch of data invalidated while nobody was subscribed.
      let start = if entry.stale && !state.in_flight.contains(key) {
        entry.fetcher.clone()
      } else {
        None
      };
      let notify = if start.is_some() {
        state.in_flight.insert(key.clone());
        entry.status = QueryStatus::Loading;
        entry.notifications(&entry.snapshot(key))
      } else {
        Vec::new()
      };
      (id, notify, start)
    };

    for (listener, snapshot) in notify {
      listener(&snapshot);
    }
    if let Some(fetcher) = start {
      debug!(%key, "stale entry refetched on subscription");
      self.spawn_fetch(key.clone(), fetcher);
    }

    Subscription {
      inner: Arc::clone(&self.inner),
      key: key.clone(),
      id,
    }
  }

  /// Fetch a key unless a fetch is already outstanding.
  ///
  /// The in-flight check and the transition to loading happen under one
  /// lock guard with no suspension point, so two tasks racing into this
  /// method cannot both start a fetch. A call during an in-flight fetch is
  /// a no-op (the fetcher is still remembered for later refetches).
  pub fn ensure_fetched<F, Fut>(&self, key: &QueryKey, fetch: F)
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Records, ApiError>> + Send + 'static,
  {
    let fetcher: Fetcher = Arc::new(move || Box::pin(fetch()));

    let notify = {
      let mut guard = Self::lock(&self.inner);
      let state = &mut *guard;
      let entry = state.entries.entry(key.clone()).or_insert_with(EntryState::new);
      entry.fetcher = Some(Arc::clone(&fetcher));

      if state.in_flight.contains(key) {
        debug!(%key, "fetch already in flight, deduplicated");
        return;
      }
      state.in_flight.insert(key.clone());
      entry.status = QueryStatus::Loading;
      entry.notifications(&entry.snapshot(key))
    };

    for (listener, snapshot) in notify {
      listener(&snapshot);
    }
    self.spawn_fetch(key.clone(), fetcher);
  }

  /// Mark matching entries outdated and refresh them.
  ///
  /// Entries with subscribers refetch immediately; if their fetch is still
  /// in flight the refetch is queued behind it (never dropped), so the cache
  /// ends up reflecting whatever the invalidating mutation changed.
  /// Entries without subscribers stay stale until the next subscription.
  pub fn invalidate(&self, selector: &KeySelector) {
    let (notify, starts) = {
      let mut guard = Self::lock(&self.inner);
      let CacheState {
        entries,
        in_flight,
        queued,
        ..
      } = &mut *guard;

      let mut notify = Vec::new();
      let mut starts = Vec::new();

      for (key, entry) in entries.iter_mut().filter(|(k, _)| k.matches(selector)) {
        entry.stale = true;

        if entry.listeners.is_empty() {
          debug!(%key, "invalidated without subscribers, refetch deferred");
          continue;
        }
        let Some(fetcher) = entry.fetcher.clone() else {
          continue;
        };

        if in_flight.contains(key) {
          // A read raced this mutation: queue a second fetch behind it.
          queued.insert(key.clone());
          debug!(%key, "invalidated mid-fetch, refetch queued");
        } else {
          in_flight.insert(key.clone());
          entry.status = QueryStatus::Loading;
          notify.extend(entry.notifications(&entry.snapshot(key)));
          starts.push((key.clone(), fetcher));
        }
      }
      (notify, starts)
    };

    for (listener, snapshot) in notify {
      listener(&snapshot);
    }
    for (key, fetcher) in starts {
      debug!(%key, "invalidated, refetching");
      self.spawn_fetch(key, fetcher);
    }
  }

  /// Run fetches for a key until none is queued behind the current one.
  fn spawn_fetch(&self, key: QueryKey, fetcher: Fetcher) {
    let inner = Arc::clone(&self.inner);
    tokio::spawn(async move {
      let mut fetcher = fetcher;
      loop {
        let result = fetcher().await;

        let (notify, next) = {
          let mut guard = Self::lock(&inner);
          let state = &mut *guard;
          let entry = state.entries.entry(key.clone()).or_insert_with(EntryState::new);

          entry.generation += 1;
          match result {
            Ok(records) => {
              entry.status = QueryStatus::Success;
              entry.data = Some(records);
              entry.error = None;
              entry.stale = false;
            }
            Err(err) => {
              debug!(%key, %err, "fetch failed");
              entry.status = QueryStatus::Error;
              // Prior data survives, but marked outdated.
              entry.stale = entry.data.is_some();
              entry.error = Some(err);
            }
          }
          let mut notify = entry.notifications(&entry.snapshot(&key));

          let next = if state.queued.remove(&key) {
            entry.status = QueryStatus::Loading;
            notify.extend(entry.notifications(&entry.snapshot(&key)));
            // Refetch with the most recently supplied fetcher.
            Some(entry.fetcher.clone().unwrap_or_else(|| Arc::clone(&fetcher)))
          } else {
            state.in_flight.remove(&key);
            None
          };
          (notify, next)
        };

        for (listener, snapshot) in notify {
          listener(&snapshot);
        }
        match next {
          Some(f) => fetcher = f,
          None => break,
        }
      }
    });
  }
}

/// Listener registration handle; unsubscribes when dropped.
pub struct Subscription {
  inner: Arc<Mutex<CacheState>>,
  key: QueryKey,
  id: u64,
}

impl Subscription {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) {
    let mut state = QueryCache::lock(&self.inner);
    if let Some(entry) = state.entries.get_mut(&self.key) {
      entry.listeners.remove(&self.id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::board::types::Comment;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  fn comment(id: &str, text: &str) -> Comment {
    Comment {
      id: id.to_string(),
      post_id: "ceda".to_string(),
      text: text.to_string(),
    }
  }

  /// Fetcher returning a fixed comment list after a small delay, counting
  /// how many times it actually ran.
  fn counted_fetcher(
    counter: Arc<AtomicU32>,
    delay: Duration,
  ) -> impl Fn() -> BoxFuture<'static, Result<Records, ApiError>> + Send + Sync + 'static {
    move || {
      let counter = Arc::clone(&counter);
      Box::pin(async move {
        tokio::time::sleep(delay).await;
        let run = counter.fetch_add(1, Ordering::SeqCst);
        Ok(Records::Comments(vec![comment(&format!("c{run}"), "hi")]))
      })
    }
  }

  async fn settled(cache: &QueryCache, key: &QueryKey) -> QueryEntry {
    for _ in 0..200 {
      let entry = cache.read(key);
      if !entry.is_loading() && entry.status != QueryStatus::Idle {
        return entry;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("query for {key} never settled");
  }

  #[tokio::test]
  async fn fetch_success_notifies_subscribers() {
    let cache = QueryCache::new();
    let key = QueryKey::comments("ceda");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let _sub = cache.subscribe(&key, move |entry| {
      seen_clone.lock().unwrap().push(entry.status);
    });

    let counter = Arc::new(AtomicU32::new(0));
    cache.ensure_fetched(&key, counted_fetcher(counter, Duration::from_millis(5)));

    let entry = settled(&cache, &key).await;
    assert!(entry.is_success());
    assert_eq!(entry.data.as_ref().unwrap().len(), 1);
    assert_eq!(entry.subscriber_count, 1);

    let seen = seen.lock().unwrap();
    assert_eq!(
      *seen,
      vec![QueryStatus::Loading, QueryStatus::Success],
      "listener sees both transitions"
    );
  }

  #[tokio::test]
  async fn concurrent_ensure_fetched_runs_the_fetcher_once() {
    let cache = QueryCache::new();
    let key = QueryKey::comments("ceda");
    let counter = Arc::new(AtomicU32::new(0));

    cache.ensure_fetched(&key, counted_fetcher(Arc::clone(&counter), Duration::from_millis(50)));
    cache.ensure_fetched(&key, counted_fetcher(Arc::clone(&counter), Duration::from_millis(50)));
    cache.ensure_fetched(&key, counted_fetcher(Arc::clone(&counter), Duration::from_millis(50)));

    settled(&cache, &key).await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn distinct_keys_fetch_independently() {
    let cache = QueryCache::new();
    let counter = Arc::new(AtomicU32::new(0));

    let a = QueryKey::comments("a");
    let b = QueryKey::comments("b");
    cache.ensure_fetched(&a, counted_fetcher(Arc::clone(&counter), Duration::from_millis(5)));
    cache.ensure_fetched(&b, counted_fetcher(Arc::clone(&counter), Duration::from_millis(5)));

    settled(&cache, &a).await;
    settled(&cache, &b).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn fetch_error_is_visible_and_keeps_stale_data() {
    let cache = QueryCache::new();
    let key = QueryKey::comments("ceda");

    let counter = Arc::new(AtomicU32::new(0));
    cache.ensure_fetched(&key, counted_fetcher(counter, Duration::from_millis(1)));
    settled(&cache, &key).await;

    cache.ensure_fetched(&key, || async {
      Err::<Records, _>(ApiError::Network("connection refused".into()))
    });

    for _ in 0..200 {
      if cache.read(&key).is_error() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let entry = cache.read(&key);
    assert!(entry.is_error());
    assert_eq!(entry.error, Some(ApiError::Network("connection refused".into())));
    assert!(entry.data.is_some(), "last good data survives");
    assert!(entry.stale);
  }

  #[tokio::test]
  async fn invalidation_during_fetch_queues_a_second_fetch() {
    let cache = QueryCache::new();
    let key = QueryKey::comments("ceda");
    let counter = Arc::new(AtomicU32::new(0));

    let _sub = cache.subscribe(&key, |_| {});
    cache.ensure_fetched(&key, counted_fetcher(Arc::clone(&counter), Duration::from_millis(40)));

    // The "mutation" lands while the read is still in flight.
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.invalidate(&KeySelector::Key(key.clone()));

    // First fetch settles, second fetch runs, cache reflects the rerun.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2, "second fetch must not be dropped");
    let entry = cache.read(&key);
    assert!(entry.is_success());
    assert!(!entry.stale);
    assert_eq!(entry.generation, 2);
  }

  #[tokio::test]
  async fn invalidation_by_resource_hits_every_filter_variant() {
    let cache = QueryCache::new();
    let counter = Arc::new(AtomicU32::new(0));

    let a = QueryKey::comments("a");
    let b = QueryKey::comments("b");
    let articles = QueryKey::articles(8);

    let _sub_a = cache.subscribe(&a, |_| {});
    let _sub_b = cache.subscribe(&b, |_| {});
    let _sub_art = cache.subscribe(&articles, |_| {});

    for key in [&a, &b, &articles] {
      cache.ensure_fetched(key, counted_fetcher(Arc::clone(&counter), Duration::from_millis(1)));
      settled(&cache, key).await;
    }
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    cache.invalidate(&KeySelector::Resource(crate::board::keys::Resource::Comments));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Both comment keys refetched; the articles key was untouched.
    assert_eq!(counter.load(Ordering::SeqCst), 5);
    assert!(!cache.read(&a).stale);
    assert!(!cache.read(&b).stale);
    assert_eq!(cache.read(&articles).generation, 1);
  }

  #[tokio::test]
  async fn unsubscribed_invalidation_defers_until_next_subscription() {
    let cache = QueryCache::new();
    let key = QueryKey::comments("ceda");
    let counter = Arc::new(AtomicU32::new(0));

    cache.ensure_fetched(&key, counted_fetcher(Arc::clone(&counter), Duration::from_millis(1)));
    settled(&cache, &key).await;

    cache.invalidate(&KeySelector::Key(key.clone()));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1, "no subscribers, no eager refetch");
    assert!(cache.read(&key).stale);

    let _sub = cache.subscribe(&key, |_| {});
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2, "subscription picks up the stale entry");
    assert!(!cache.read(&key).stale);
  }

  #[tokio::test]
  async fn dropping_the_subscription_unregisters_the_listener() {
    let cache = QueryCache::new();
    let key = QueryKey::comments("ceda");

    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);
    let sub = cache.subscribe(&key, move |_| {
      calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(cache.read(&key).subscriber_count, 1);

    sub.unsubscribe();
    assert_eq!(cache.read(&key).subscriber_count, 0);

    let counter = Arc::new(AtomicU32::new(0));
    cache.ensure_fetched(&key, counted_fetcher(counter, Duration::from_millis(1)));
    settled(&cache, &key).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn read_of_an_unknown_key_is_idle() {
    let cache = QueryCache::new();
    let entry = cache.read(&QueryKey::comments("nope"));
    assert_eq!(entry.status, QueryStatus::Idle);
    assert!(entry.data.is_none());
    assert!(entry.error.is_none());
    assert_eq!(entry.generation, 0);
  }
}
