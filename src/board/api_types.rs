//! Serde types matching the REST API's JSON contract.
//!
//! Field names on the wire (`postId`, `cafe_address`, ...) are the contract;
//! these types keep the serde attributes out of the domain structs.

use serde::{Deserialize, Serialize};

use super::types::{Article, Comment, NewComment};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiComment {
  pub id: String,
  #[serde(rename = "postId")]
  pub post_id: String,
  pub text: String,
}

impl From<ApiComment> for Comment {
  fn from(api: ApiComment) -> Self {
    Comment {
      id: api.id,
      post_id: api.post_id,
      text: api.text,
    }
  }
}

impl From<&Comment> for ApiComment {
  fn from(comment: &Comment) -> Self {
    ApiComment {
      id: comment.id.clone(),
      post_id: comment.post_id.clone(),
      text: comment.text.clone(),
    }
  }
}

/// Create payload: the server assigns the id, so none is sent.
#[derive(Debug, Serialize)]
pub struct ApiNewComment {
  #[serde(rename = "postId")]
  pub post_id: String,
  pub text: String,
}

impl From<&NewComment> for ApiNewComment {
  fn from(draft: &NewComment) -> Self {
    ApiNewComment {
      post_id: draft.post_id.clone(),
      text: draft.text.clone(),
    }
  }
}

/// Articles travel with snake_case field names, so the wire shape is the
/// domain shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiArticle {
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

impl From<ApiArticle> for Article {
  fn from(api: ApiArticle) -> Self {
    Article {
      id: api.id,
      title: api.title,
      content: api.content,
      category: api.category,
      author_id: api.author_id,
      date: api.date,
      cafe_address: api.cafe_address,
      cafe_name: api.cafe_name,
      region: api.region,
    }
  }
}

impl From<&Article> for ApiArticle {
  fn from(article: &Article) -> Self {
    ApiArticle {
      id: article.id.clone(),
      title: article.title.clone(),
      content: article.content.clone(),
      category: article.category.clone(),
      author_id: article.author_id.clone(),
      date: article.date.clone(),
      cafe_address: article.cafe_address.clone(),
      cafe_name: article.cafe_name.clone(),
      region: article.region.clone(),
    }
  }
}

/// Response body of an object-storage upload.
#[derive(Debug, Deserialize)]
pub struct ApiUploadResult {
  /// Bucket-qualified object path, e.g. `posts/{article_id}/{millis}`
  #[serde(rename = "fullPath")]
  pub full_path: Option<String>,
  #[serde(rename = "Key")]
  pub key: Option<String>,
}
