//! Mutation coordination: run a write against the gateway, then invalidate
//! the query keys it could have touched.
//!
//! Each method resolves only after the invalidation has been scheduled, so a
//! caller that awaits it (e.g. to leave comment-edit mode) can be sure the
//! cache refresh is already underway. A failed gateway call short-circuits:
//! no invalidation fires and the cache is exactly as it was before the
//! mutation.

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::board::client::BoardClient;
use crate::board::keys::{KeySelector, QueryKey, Resource};
use crate::board::types::{Article, ArticleDraft, Comment, NewComment};
use crate::error::ApiError;
use crate::query::QueryCache;

#[derive(Clone)]
pub struct MutationCoordinator {
  client: BoardClient,
  cache: QueryCache,
}

impl MutationCoordinator {
  pub fn new(client: BoardClient, cache: QueryCache) -> Self {
    Self { client, cache }
  }

  /// Create a comment. Invalidates every cached comment collection, whatever
  /// post it belongs to.
  pub async fn create_comment(&self, draft: NewComment) -> Result<Comment, ApiError> {
    draft.validate()?;

    let created = self.client.create_comment(&draft).await.map_err(log_abort)?;
    self.cache.invalidate(&KeySelector::Resource(Resource::Comments));
    debug!(id = %created.id, post_id = %created.post_id, "comment created, comments invalidated");
    Ok(created)
  }

  /// Update a comment in place. The whole entity is sent even when nothing
  /// changed. Invalidates the comment collection of its post.
  pub async fn update_comment(&self, comment: Comment) -> Result<Comment, ApiError> {
    if comment.text.trim().is_empty() {
      return Err(ApiError::validation("comment text is required"));
    }

    let updated = self.client.update_comment(&comment).await.map_err(log_abort)?;
    self
      .cache
      .invalidate(&KeySelector::Key(QueryKey::comments(&updated.post_id)));
    Ok(updated)
  }

  /// Delete a comment. Invalidates the comment collection of its post.
  pub async fn delete_comment(&self, post_id: &str, id: &str) -> Result<(), ApiError> {
    self.client.delete_comment(id).await.map_err(log_abort)?;
    self
      .cache
      .invalidate(&KeySelector::Key(QueryKey::comments(post_id)));
    debug!(id, post_id, "comment deleted, post comments invalidated");
    Ok(())
  }

  /// Create an article from the composer draft. The id is generated here
  /// (client-side) and the date stamped; invalidates the whole article key
  /// family, since any limit-parameterized listing could now include it.
  pub async fn create_article(&self, draft: ArticleDraft) -> Result<Article, ApiError> {
    draft.validate()?;

    let article = draft.into_article(Uuid::new_v4().to_string(), now_stamp());
    let created = self.client.create_article(&article).await.map_err(log_abort)?;
    self.cache.invalidate(&KeySelector::Resource(Resource::Articles));
    debug!(id = %created.id, "article created, articles invalidated");
    Ok(created)
  }

  /// Update an existing article from the composer draft, keeping its id and
  /// original date. Invalidates the article key family.
  pub async fn update_article(&self, id: &str, date: &str, draft: ArticleDraft) -> Result<Article, ApiError> {
    draft.validate()?;

    let article = draft.into_article(id.to_string(), date.to_string());
    let updated = self.client.update_article(&article).await.map_err(log_abort)?;
    self.cache.invalidate(&KeySelector::Resource(Resource::Articles));
    Ok(updated)
  }
}

fn now_stamp() -> String {
  Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn log_abort(err: ApiError) -> ApiError {
  warn!(%err, "mutation failed, skipping invalidation");
  err
}
