//! Client-side data synchronization core for a community board.
//!
//! The crate keeps server-derived collections (comments, articles) cached
//! and consistent while the user reads and writes:
//!
//! - [`board::client::BoardClient`]: thin typed gateway over the REST API
//! - [`query::QueryCache`]: keyed query cache with subscriptions, fetch
//!   de-duplication, and exact/prefix invalidation
//! - [`mutate::MutationCoordinator`]: writes followed by targeted
//!   invalidation, with fail-fast validation and no partial effects
//! - [`list::IncrementalList`]: scroll-driven pagination with a
//!   monotonically growing window and client-side sorting
//! - [`session::Session`]: explicit wiring of the above; the seam the
//!   rendering layer is built on

pub mod board;
pub mod config;
pub mod debounce;
pub mod error;
pub mod list;
pub mod mutate;
pub mod query;
pub mod session;

pub use board::client::BoardClient;
pub use board::keys::{KeySelector, QueryKey, Resource};
pub use board::storage::StorageClient;
pub use board::types::{Article, ArticleDraft, Comment, NewComment, Records};
pub use config::Config;
pub use debounce::Debouncer;
pub use error::ApiError;
pub use list::{IncrementalList, ListPhase, SortOrder};
pub use mutate::MutationCoordinator;
pub use query::{QueryCache, QueryEntry, QueryStatus, Subscription};
pub use session::{ListHandle, Session};
