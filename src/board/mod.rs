//! Board domain: entities, query keys, and the remote data gateway.

pub mod api_types;
pub mod client;
pub mod keys;
pub mod storage;
pub mod types;
