//! Incremental list loading: a scroll-driven window over a paginated
//! collection, fetched through the query cache.
//!
//! The loader owns a window size that only grows. Scrolling near the bottom
//! of the viewport widens the window by one page and refetches; scrolls that
//! arrive while a fetch is underway (or after the data ran out) are dropped,
//! so a burst of scroll events never turns into a request storm. When a
//! widened fetch comes back with no new items the list is exhausted, which
//! is terminal.
//!
//! Completion is consumed in the poll model: subscription notifications are
//! queued on a channel and [`IncrementalList::poll`] drains them and
//! reconciles against the cache, returning whether anything changed.

use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use crate::board::keys::QueryKey;
use crate::board::types::{Article, Records};
use crate::config::ListConfig;
use crate::error::ApiError;
use crate::query::{QueryCache, Subscription};

/// Loader state machine. `Exhausted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPhase {
  Idle,
  Loading,
  Loaded,
  Exhausted,
}

/// User-selectable orderings for the materialized window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
  /// Lexicographic by title, case-insensitive, ascending
  TitleAsc,
  /// Most recent first
  DateDesc,
}

type ArticleSource = Arc<dyn Fn(usize) -> BoxFuture<'static, Result<Vec<Article>, ApiError>> + Send + Sync>;

pub struct IncrementalList {
  cache: QueryCache,
  source: ArticleSource,

  phase: ListPhase,
  window_size: usize,
  has_more: bool,
  /// Item count of the previous settled fetch; a growth fetch that does not
  /// beat it exhausts the list
  last_settled_len: usize,
  /// True while the in-flight fetch is one we asked for (initial or scroll
  /// growth), as opposed to an invalidation-driven refresh
  growth_pending: bool,
  window: Vec<Article>,
  last_error: Option<ApiError>,
  seen_generation: u64,

  initial_window: usize,
  page_increment: usize,
  threshold_px: u32,

  notify_tx: mpsc::UnboundedSender<()>,
  notify_rx: mpsc::UnboundedReceiver<()>,
  // Held so the current window key keeps a subscriber; replaced when the key grows.
  _subscription: Option<Subscription>,
}

impl IncrementalList {
  pub fn new<F, Fut>(cache: QueryCache, config: ListConfig, source: F) -> Self
  where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Vec<Article>, ApiError>> + Send + 'static,
  {
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    Self {
      cache,
      source: Arc::new(move |limit| Box::pin(source(limit))),
      phase: ListPhase::Idle,
      window_size: 0,
      has_more: true,
      last_settled_len: 0,
      growth_pending: false,
      window: Vec::new(),
      last_error: None,
      seen_generation: 0,
      initial_window: config.initial_window,
      page_increment: config.page_increment,
      threshold_px: config.scroll_threshold_px,
      notify_tx,
      notify_rx,
      _subscription: None,
    }
  }

  pub fn phase(&self) -> ListPhase {
    self.phase
  }

  /// The currently materialized window, in fetch order unless [`sort`]
  /// reordered it.
  ///
  /// [`sort`]: Self::sort
  pub fn items(&self) -> &[Article] {
    &self.window
  }

  pub fn window_size(&self) -> usize {
    self.window_size
  }

  pub fn has_more(&self) -> bool {
    self.has_more
  }

  pub fn last_error(&self) -> Option<&ApiError> {
    self.last_error.as_ref()
  }

  /// Cache key of the current window.
  pub fn key(&self) -> QueryKey {
    QueryKey::articles(self.window_size)
  }

  /// Kick off the initial fetch. A no-op unless the loader is idle; after a
  /// failed initial fetch it can be called again to retry.
  pub fn start(&mut self) {
    if self.phase != ListPhase::Idle {
      return;
    }
    if self.window_size == 0 {
      self.window_size = self.initial_window;
    }
    self.begin_fetch();
  }

  /// Report a scroll position, as distance in pixels from the bottom of the
  /// document. Within the threshold, widens the window by one page and
  /// refetches. Ignored while a fetch is in flight, once the list is
  /// exhausted, or before [`start`].
  ///
  /// [`start`]: Self::start
  pub fn on_scroll(&mut self, distance_to_bottom_px: u32) {
    if distance_to_bottom_px > self.threshold_px {
      return;
    }
    if self.phase != ListPhase::Loaded || !self.has_more {
      return;
    }
    self.window_size += self.page_increment;
    debug!(window_size = self.window_size, "scroll trigger accepted, widening window");
    self.begin_fetch();
  }

  /// Re-apply an ordering to the materialized window. Pure and local: no
  /// network, no cache writes, and `has_more`/`window_size` are untouched.
  /// The next completed fetch materializes in fetch order again.
  pub fn sort(&mut self, order: SortOrder) {
    sort_articles(&mut self.window, order);
  }

  /// Drain completion notifications and reconcile with the cache. Returns
  /// true if the loader's observable state changed (render again).
  pub fn poll(&mut self) -> bool {
    let mut notified = false;
    while self.notify_rx.try_recv().is_ok() {
      notified = true;
    }

    let entry = self.cache.read(&self.key());
    if entry.generation == self.seen_generation {
      return notified;
    }
    self.seen_generation = entry.generation;

    if let Some(err) = entry.error {
      // A growth fetch failed: fall back to the previous phase and leave
      // retry to the next scroll. window_size stays widened (monotonic).
      self.last_error = Some(err);
      if self.growth_pending {
        self.growth_pending = false;
        self.phase = if self.window.is_empty() {
          ListPhase::Idle
        } else {
          ListPhase::Loaded
        };
      }
      return true;
    }

    if let Some(Records::Articles(rows)) = entry.data {
      self.last_error = None;
      if self.growth_pending {
        self.growth_pending = false;
        if rows.len() <= self.last_settled_len {
          debug!(len = rows.len(), "window stopped growing, list exhausted");
          self.has_more = false;
          self.phase = ListPhase::Exhausted;
        } else {
          self.phase = ListPhase::Loaded;
        }
      }
      // Otherwise an invalidation refreshed the current window: contents
      // are replaced, but a same-size refetch says nothing about has_more.
      self.last_settled_len = rows.len();
      self.window = rows;
      return true;
    }

    notified
  }

  fn begin_fetch(&mut self) {
    let key = self.key();

    let tx = self.notify_tx.clone();
    self._subscription = Some(self.cache.subscribe(&key, move |_| {
      let _ = tx.send(());
    }));

    self.phase = ListPhase::Loading;
    self.growth_pending = true;
    self.seen_generation = self.cache.read(&key).generation;

    let source = Arc::clone(&self.source);
    let limit = self.window_size;
    self.cache.ensure_fetched(&key, move || {
      let source = Arc::clone(&source);
      async move { source(limit).await.map(Records::Articles) }
    });
  }
}

/// Stable client-side sort; ties keep their fetch order.
pub fn sort_articles(items: &mut [Article], order: SortOrder) {
  match order {
    SortOrder::TitleAsc => {
      items.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
    }
    SortOrder::DateDesc => {
      items.sort_by(|a, b| parse_date(&b.date).cmp(&parse_date(&a.date)));
    }
  }
}

/// Accept the date formats articles actually carry; unparseable dates sink
/// to the end of a descending sort.
fn parse_date(raw: &str) -> Option<NaiveDateTime> {
  if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
    return Some(dt.naive_utc());
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
    return Some(dt);
  }
  chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
}
