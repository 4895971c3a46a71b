//! Query keys: the identifiers cached collections are stored and
//! invalidated under.

use std::collections::BTreeMap;
use std::fmt;

/// Server-side collections the cache knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
  Comments,
  Articles,
}

impl Resource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Resource::Comments => "comments",
      Resource::Articles => "articles",
    }
  }
}

impl fmt::Display for Resource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identifier for a cached collection: resource name plus filter parameters.
///
/// Two keys are equal iff the resource and every filter value match; the
/// sorted map makes equality and hashing order-independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  resource: Resource,
  filters: BTreeMap<String, String>,
}

impl QueryKey {
  pub fn new(resource: Resource, filters: BTreeMap<String, String>) -> Self {
    Self { resource, filters }
  }

  /// Key for the comments of one post: `(comments, {postId})`.
  pub fn comments(post_id: &str) -> Self {
    let mut filters = BTreeMap::new();
    filters.insert("postId".to_string(), post_id.to_string());
    Self::new(Resource::Comments, filters)
  }

  /// Key for a limited article listing: `(articles, {limit})`.
  pub fn articles(limit: usize) -> Self {
    let mut filters = BTreeMap::new();
    filters.insert("limit".to_string(), limit.to_string());
    Self::new(Resource::Articles, filters)
  }

  pub fn resource(&self) -> Resource {
    self.resource
  }

  pub fn filter(&self, name: &str) -> Option<&str> {
    self.filters.get(name).map(String::as_str)
  }

  pub fn matches(&self, selector: &KeySelector) -> bool {
    match selector {
      KeySelector::Key(key) => self == key,
      KeySelector::Resource(resource) => self.resource == *resource,
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.resource)?;
    for (name, value) in &self.filters {
      write!(f, ":{name}={value}")?;
    }
    Ok(())
  }
}

/// What an invalidation targets: one exact key, or every key of a resource
/// regardless of filter parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelector {
  Key(QueryKey),
  Resource(Resource),
}

impl fmt::Display for KeySelector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeySelector::Key(key) => write!(f, "{key}"),
      KeySelector::Resource(resource) => write!(f, "{resource}/*"),
    }
  }
}
