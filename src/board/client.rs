use std::time::Duration;

use tracing::debug;

use crate::board::api_types::{ApiArticle, ApiComment, ApiNewComment};
use crate::board::types::{Article, Comment, NewComment};
use crate::config::Config;
use crate::error::ApiError;

/// Remote data gateway: a thin typed wrapper over the board REST API.
///
/// No caching and no retries live here; both are caller concerns. Only
/// `fetch_*` and `delete_comment` are idempotent.
#[derive(Clone)]
pub struct BoardClient {
  http: reqwest::Client,
  base: String,
}

impl BoardClient {
  pub fn new(config: &Config) -> Result<Self, ApiError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()?;

    Ok(Self {
      http,
      base: config.api.base_url.as_str().trim_end_matches('/').to_string(),
    })
  }

  fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.base, path)
  }

  /// `GET /articles?_limit=N`
  pub async fn fetch_articles(&self, limit: usize) -> Result<Vec<Article>, ApiError> {
    debug!(limit, "fetching articles");
    let response = self
      .http
      .get(self.endpoint("articles"))
      .query(&[("_limit", limit.to_string())])
      .send()
      .await?;

    let rows: Vec<ApiArticle> = Self::checked(response).await?.json().await?;
    Ok(rows.into_iter().map(Article::from).collect())
  }

  /// `GET /comments?postId=ID`
  pub async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>, ApiError> {
    debug!(post_id, "fetching comments");
    let response = self
      .http
      .get(self.endpoint("comments"))
      .query(&[("postId", post_id)])
      .send()
      .await?;

    let rows: Vec<ApiComment> = Self::checked(response).await?.json().await?;
    Ok(rows.into_iter().map(Comment::from).collect())
  }

  /// `POST /comments`: the server assigns and returns the id.
  pub async fn create_comment(&self, draft: &NewComment) -> Result<Comment, ApiError> {
    let response = self
      .http
      .post(self.endpoint("comments"))
      .json(&ApiNewComment::from(draft))
      .send()
      .await?;

    let created: ApiComment = Self::checked(response).await?.json().await?;
    debug!(id = %created.id, post_id = %created.post_id, "comment created");
    Ok(created.into())
  }

  /// `PATCH /comments/:id`: the whole entity is sent, changed or not.
  pub async fn update_comment(&self, comment: &Comment) -> Result<Comment, ApiError> {
    let response = self
      .http
      .patch(self.endpoint(&format!("comments/{}", comment.id)))
      .json(&ApiComment::from(comment))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(ApiError::not_found("comments", &comment.id));
    }
    let updated: ApiComment = Self::checked(response).await?.json().await?;
    Ok(updated.into())
  }

  /// `DELETE /comments/:id`: deleting an absent id fails with `NotFound`.
  pub async fn delete_comment(&self, id: &str) -> Result<(), ApiError> {
    let response = self
      .http
      .delete(self.endpoint(&format!("comments/{id}")))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(ApiError::not_found("comments", id));
    }
    Self::checked(response).await?;
    debug!(id, "comment deleted");
    Ok(())
  }

  /// `POST /articles`: the id and date are already client-assigned.
  pub async fn create_article(&self, article: &Article) -> Result<Article, ApiError> {
    let response = self
      .http
      .post(self.endpoint("articles"))
      .json(&ApiArticle::from(article))
      .send()
      .await?;

    let created: ApiArticle = Self::checked(response).await?.json().await?;
    debug!(id = %created.id, "article created");
    Ok(created.into())
  }

  /// `PATCH /articles/:id`
  pub async fn update_article(&self, article: &Article) -> Result<Article, ApiError> {
    let response = self
      .http
      .patch(self.endpoint(&format!("articles/{}", article.id)))
      .json(&ApiArticle::from(article))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(ApiError::not_found("articles", &article.id));
    }
    let updated: ApiArticle = Self::checked(response).await?.json().await?;
    Ok(updated.into())
  }

  /// Turn a non-2xx response into `ApiError::Server`, keeping whatever the
  /// server put in the body as the message.
  async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ApiError::Server {
      status: status.as_u16(),
      message,
    })
  }
}
