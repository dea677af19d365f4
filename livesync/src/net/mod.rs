//! Network side of the sync layer: the shared notification connection and
//! the REST client for entity collections.

pub mod api;
pub mod backoff;
pub mod connection;
pub mod listeners;
pub mod transport;
