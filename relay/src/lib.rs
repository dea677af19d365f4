//! Notification relay.
//!
//! Every dashboard session holds one WebSocket to `/socket`. Entity delta
//! events a session emits are stamped with its client id and fanned out to
//! every other session; the sender gets an ack saying how many peers the
//! event reached. The relay keeps no entity state of its own.

pub mod hub;
pub mod routes;

pub use hub::Hub;
pub use routes::app;

pub const DEFAULT_PORT: u16 = 4000;

/// Read a typed value from the environment, falling back to `default` when
/// the key is missing or unparseable.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}
