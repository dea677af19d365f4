//! REST access to entity collections.
//!
//! Each kind lives under `/{plural}` with the usual list/get/create/update/
//! delete routes. List responses may be a bare array or wrap it under `data`
//! or the plural name; single-entity responses may be wrapped under `data`
//! or the singular name.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::config::SyncConfig;
use crate::state::entity::{Entity, EntityKind};

/// Shown when neither the server nor the transport said anything useful.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// User-facing text for an error banner.
    #[must_use]
    pub fn message(&self) -> String {
        let text = self.to_string();
        if text.trim().is_empty() { GENERIC_ERROR_MESSAGE.to_owned() } else { text }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Normalize an error to display text: the body's `message`, else its
/// `error`, else the transport text, else a generic message.
#[must_use]
pub fn error_message(body: Option<&Value>, transport: Option<&str>) -> String {
    let from_body = |key: &str| {
        body.and_then(|b| b.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    from_body("message")
        .or_else(|| from_body("error"))
        .or_else(|| transport.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned))
        .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_owned())
}

/// Pull the entity array out of a list response.
///
/// # Errors
///
/// Returns `Decode` if no array is found.
pub fn extract_list(body: Value, kind: EntityKind) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in ["data", kind.collection()] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }
            Err(ApiError::Decode(format!("no {} array in response", kind.collection())))
        }
        other => Err(ApiError::Decode(format!("expected a {} list, got {other}", kind.collection()))),
    }
}

/// Pull a single entity out of a response, unwrapping `data` or the
/// singular name when present.
#[must_use]
pub fn extract_entity(body: Value, kind: EntityKind) -> Value {
    match body {
        Value::Object(mut map) if !map.contains_key("id") && !map.contains_key("_id") => {
            for key in ["data", kind.as_str()] {
                if let Some(inner @ Value::Object(_)) = map.remove(key) {
                    return inner;
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn decode_entity<E: Entity>(body: Value) -> Result<E, ApiError> {
    serde_json::from_value(extract_entity(body, E::KIND))
        .map_err(|error| ApiError::Decode(format!("{}: {error}", E::KIND)))
}

/// Collection endpoints for one entity kind.
#[async_trait::async_trait]
pub trait EntityApi<E: Entity>: Send + Sync {
    async fn list(&self) -> Result<Vec<E>, ApiError>;
    async fn get(&self, id: &str) -> Result<E, ApiError>;
    async fn create(&self, data: &Value) -> Result<E, ApiError>;
    async fn update(&self, id: &str, data: &Value) -> Result<E, ApiError>;
    async fn delete(&self, id: &str) -> Result<(), ApiError>;
}

/// `reqwest`-backed client for every kind.
#[derive(Clone, Debug)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_owned() })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> Result<Self, ApiError> {
        Self::new(config.api_url.clone(), config.http_timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, kind: EntityKind, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{}/{id}", self.base_url, kind.collection()),
            None => format!("{}/{}", self.base_url, kind.collection()),
        }
    }

    async fn request(&self, method: Method, url: String, body: Option<&Value>) -> Result<Value, ApiError> {
        debug!(%method, %url, "api request");
        let request = self.http.request(method, &url);
        let request = if let Some(json) = body { request.json(json) } else { request };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str::<Value>(&text).unwrap_or(Value::Null)
        };

        if !status.is_success() {
            let transport = format!("Request failed with status code {}", status.as_u16());
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(Some(&value), Some(&transport)),
            });
        }
        Ok(value)
    }
}

#[async_trait::async_trait]
impl<E: Entity> EntityApi<E> for RestClient {
    async fn list(&self) -> Result<Vec<E>, ApiError> {
        let body = self.request(Method::GET, self.url(E::KIND, None), None).await?;
        extract_list(body, E::KIND)?
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|error| ApiError::Decode(format!("{}: {error}", E::KIND)))
            })
            .collect()
    }

    async fn get(&self, id: &str) -> Result<E, ApiError> {
        let body = self.request(Method::GET, self.url(E::KIND, Some(id)), None).await?;
        decode_entity(body)
    }

    async fn create(&self, data: &Value) -> Result<E, ApiError> {
        let body = self.request(Method::POST, self.url(E::KIND, None), Some(data)).await?;
        decode_entity(body)
    }

    async fn update(&self, id: &str, data: &Value) -> Result<E, ApiError> {
        let body = self.request(Method::PUT, self.url(E::KIND, Some(id)), Some(data)).await?;
        decode_entity(body)
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.request(Method::DELETE, self.url(E::KIND, Some(id)), None).await?;
        Ok(())
    }
}
