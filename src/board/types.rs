use crate::board::keys::Resource;
use crate::error::ApiError;

/// A comment attached to a post. The id is assigned by the server on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
  pub id: String,
  pub post_id: String,
  pub text: String,
}

/// A board article. The id is generated client-side before the create call;
/// `date` is stamped at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
  pub id: String,
  pub title: String,
  pub content: String,
  pub category: String,
  pub author_id: String,
  pub date: String,
  pub cafe_address: String,
  pub cafe_name: String,
  pub region: String,
}

/// Payload for creating a comment. The server assigns the id.
#[derive(Debug, Clone)]
pub struct NewComment {
  pub post_id: String,
  pub text: String,
}

impl NewComment {
  /// Client-side required-field check, run before any network traffic.
  pub fn validate(&self) -> Result<(), ApiError> {
    if self.text.trim().is_empty() {
      return Err(ApiError::validation("comment text is required"));
    }
    Ok(())
  }
}

/// Article form fields as the composer produces them, before an id and
/// date are assigned.
#[derive(Debug, Clone, Default)]
pub struct ArticleDraft {
  pub title: String,
  pub content: String,
  pub category: String,
  pub author_id: String,
  pub cafe_address: String,
  pub cafe_name: String,
  pub region: String,
}

impl ArticleDraft {
  /// Client-side required-field check, run before any network traffic.
  pub fn validate(&self) -> Result<(), ApiError> {
    if self.title.trim().is_empty() {
      return Err(ApiError::validation("title is required"));
    }
    if self.content.trim().is_empty() {
      return Err(ApiError::validation("content is required"));
    }
    if self.cafe_address.trim().is_empty() {
      return Err(ApiError::validation("cafe address is required"));
    }
    if self.cafe_name.trim().is_empty() {
      return Err(ApiError::validation("cafe name is required"));
    }
    Ok(())
  }

  /// Promote the draft to a full article with the given id and date.
  pub fn into_article(self, id: String, date: String) -> Article {
    Article {
      id,
      title: self.title,
      content: self.content,
      category: self.category,
      author_id: self.author_id,
      date,
      cafe_address: self.cafe_address,
      cafe_name: self.cafe_name,
      region: self.region,
    }
  }
}

/// An ordered collection as the cache holds it. The variant always matches
/// the resource of the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Records {
  Comments(Vec<Comment>),
  Articles(Vec<Article>),
}

impl Records {
  pub fn resource(&self) -> Resource {
    match self {
      Records::Comments(_) => Resource::Comments,
      Records::Articles(_) => Resource::Articles,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Records::Comments(items) => items.len(),
      Records::Articles(items) => items.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn as_comments(&self) -> Option<&[Comment]> {
    match self {
      Records::Comments(items) => Some(items),
      Records::Articles(_) => None,
    }
  }

  pub fn as_articles(&self) -> Option<&[Article]> {
    match self {
      Records::Articles(items) => Some(items),
      Records::Comments(_) => None,
    }
  }
}
