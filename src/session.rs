//! Session wiring: one cache, one gateway, and the handles the rendering
//! layer consumes.
//!
//! A [`Session`] is constructed explicitly at application start and dropped
//! at the end; tests build a fresh one per run. Nothing in the crate reaches
//! for ambient global state: one [`QueryCache`] instance is constructed
//! here and handed to every dependent.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::board::client::BoardClient;
use crate::board::keys::QueryKey;
use crate::board::storage::StorageClient;
use crate::board::types::Records;
use crate::config::Config;
use crate::debounce::Debouncer;
use crate::error::ApiError;
use crate::list::IncrementalList;
use crate::mutate::MutationCoordinator;
use crate::query::{Fetcher, QueryCache, QueryEntry, Subscription};

pub struct Session {
  config: Config,
  client: BoardClient,
  storage: StorageClient,
  cache: QueryCache,
  mutations: MutationCoordinator,
}

impl Session {
  pub fn new(config: Config) -> Result<Self, ApiError> {
    let client = BoardClient::new(&config)?;
    let storage = StorageClient::new(&config)?;
    let cache = QueryCache::new();
    let mutations = MutationCoordinator::new(client.clone(), cache.clone());

    info!(api = %config.api.base_url, "session started");

    Ok(Self {
      config,
      client,
      storage,
      cache,
      mutations,
    })
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  pub fn mutations(&self) -> &MutationCoordinator {
    &self.mutations
  }

  /// Seam for the editor's image-upload hook.
  pub fn storage(&self) -> &StorageClient {
    &self.storage
  }

  /// Subscribe to the comments of a post, fetching them if needed.
  pub fn comments(&self, post_id: &str) -> ListHandle {
    let client = self.client.clone();
    let post_id_owned = post_id.to_string();
    let source: Fetcher = Arc::new(move || {
      let client = client.clone();
      let post_id = post_id_owned.clone();
      Box::pin(async move { client.fetch_comments(&post_id).await.map(Records::Comments) })
    });
    ListHandle::new(self.cache.clone(), QueryKey::comments(post_id), source)
  }

  /// Subscribe to a fixed-limit article listing, fetching it if needed.
  pub fn articles(&self, limit: usize) -> ListHandle {
    let client = self.client.clone();
    let source: Fetcher = Arc::new(move || {
      let client = client.clone();
      Box::pin(async move { client.fetch_articles(limit).await.map(Records::Articles) })
    });
    ListHandle::new(self.cache.clone(), QueryKey::articles(limit), source)
  }

  /// Scroll-driven article feed, configured from [`Config::list`].
  pub fn article_feed(&self) -> IncrementalList {
    let client = self.client.clone();
    IncrementalList::new(self.cache.clone(), self.config.list, move |limit| {
      let client = client.clone();
      async move { client.fetch_articles(limit).await }
    })
  }

  /// Coalesce rapid cafe-address edits into at most one lookup per quiet
  /// period (delay from [`Config::coalesce_delay_ms`]).
  pub fn address_coalescer<F>(&self, sink: F) -> Debouncer<String>
  where
    F: Fn(String) + Send + 'static,
  {
    Debouncer::new(
      std::time::Duration::from_millis(self.config.coalesce_delay_ms),
      sink,
    )
  }
}

/// A live view onto one cached collection: the `read + subscribe` pair
/// bundled for the rendering layer, polled from its event loop.
pub struct ListHandle {
  cache: QueryCache,
  key: QueryKey,
  source: Fetcher,
  notify_rx: mpsc::UnboundedReceiver<()>,
  _subscription: Subscription,
}

impl ListHandle {
  fn new(cache: QueryCache, key: QueryKey, source: Fetcher) -> Self {
    let (tx, notify_rx) = mpsc::unbounded_channel();
    let subscription = cache.subscribe(&key, move |_| {
      let _ = tx.send(());
    });

    let fetch = Arc::clone(&source);
    cache.ensure_fetched(&key, move || (fetch)());

    Self {
      cache,
      key,
      source,
      notify_rx,
      _subscription: subscription,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Current cache state for this key.
  pub fn snapshot(&self) -> QueryEntry {
    self.cache.read(&self.key)
  }

  /// Drain change notifications. Returns true if anything changed since the
  /// last poll (render again).
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while self.notify_rx.try_recv().is_ok() {
      changed = true;
    }
    changed
  }

  /// Manual retry: re-run the fetch unless one is already in flight.
  pub fn refetch(&self) {
    let fetch = Arc::clone(&self.source);
    self.cache.ensure_fetched(&self.key, move || (fetch)());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::QueryStatus;
  use std::time::Duration;

  fn offline_session() -> Session {
    let mut config = Config::default();
    // A port nothing listens on: every fetch fails fast with Network.
    config.api.base_url = url::Url::parse("http://127.0.0.1:9").unwrap();
    Session::new(config).unwrap()
  }

  #[tokio::test]
  async fn comment_handle_surfaces_fetch_errors_to_subscribers() {
    let session = offline_session();
    let mut handle = session.comments("ceda");

    assert!(handle.snapshot().is_loading());

    for _ in 0..200 {
      handle.poll();
      if handle.snapshot().is_error() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let entry = handle.snapshot();
    assert_eq!(entry.status, QueryStatus::Error);
    assert!(matches!(entry.error, Some(ApiError::Network(_))));
    assert!(entry.data.is_none());
    assert_eq!(entry.subscriber_count, 1);
  }

  #[tokio::test]
  async fn two_handles_on_one_key_share_a_single_fetch() {
    let session = offline_session();
    let first = session.comments("ceda");
    let second = session.comments("ceda");

    // Same key, both subscribed to the same entry.
    assert_eq!(first.key(), second.key());
    assert_eq!(first.snapshot().subscriber_count, 2);
    assert_eq!(second.snapshot().subscriber_count, 2);
  }

  #[tokio::test]
  async fn address_coalescer_uses_the_configured_delay() {
    let mut config = Config::default();
    config.coalesce_delay_ms = 10;
    config.api.base_url = url::Url::parse("http://127.0.0.1:9").unwrap();
    let session = Session::new(config).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let coalescer = session.address_coalescer(move |addr| {
      let _ = tx.send(addr);
    });

    coalescer.submit("12 r".into());
    coalescer.submit("12 river st".into());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rx.try_recv().unwrap(), "12 river st");
    assert!(rx.try_recv().is_err(), "one lookup per quiet period");
  }
}
