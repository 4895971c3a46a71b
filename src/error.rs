use thiserror::Error;

/// Errors surfaced by the data layer.
///
/// Every failure is recoverable at the caller boundary; nothing here is fatal
/// to the process. Variants are `Clone` so cache snapshots can carry the last
/// error alongside stale data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  /// The request never produced a usable response (DNS, refused connection,
  /// timeout, truncated body).
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a non-2xx status.
  #[error("server returned {status}: {message}")]
  Server { status: u16, message: String },

  /// A required field was missing before submission. Raised client-side,
  /// before any request is made.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The target of a mutation does not exist (e.g. deleting an
  /// already-deleted comment).
  #[error("no {resource} with id {id}")]
  NotFound { resource: String, id: String },
}

impl ApiError {
  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(message.into())
  }

  pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
    Self::NotFound {
      resource: resource.into(),
      id: id.into(),
    }
  }

  /// True for failures that left the server state unknown (worth a manual
  /// retry), as opposed to definitive rejections.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Network(_) | Self::Server { status: 500..=599, .. })
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    // Decode failures of a 2xx body land here too: the response was unusable,
    // which the caller cannot distinguish from a dropped connection.
    Self::Network(err.to_string())
  }
}
