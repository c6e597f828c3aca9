//! HTTP remote store.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so that any
//! library (reqwest, hyper, a platform fetch bridge) can be plugged in.
//! Records are addressed as `{base_url}/{entity_type}/{entity_id}`; the
//! reachability check is `GET {base_url}/health`.

use crate::remote::RemoteStore;
use async_trait::async_trait;
use hangar_sync_protocol::{EntityType, RemoteError};
use parking_lot::RwLock;
use thiserror::Error;

/// HTTP method used by [`HttpRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read.
    Get,
    /// Create or replace.
    Put,
    /// Remove.
    Delete,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Bearer token, if configured.
    pub bearer: Option<String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with an empty body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// Failures below the HTTP layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,
    /// The connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connect(String),
}

/// HTTP client abstraction.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response, whatever its status.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// HTTP-based remote store.
pub struct HttpRemote<C: HttpClient> {
    base_url: String,
    bearer: Option<String>,
    client: C,
    last_error: RwLock<Option<RemoteError>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a remote for `base_url` (e.g. `https://api.example.com/v1`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer: None,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Sets the bearer token sent with every request.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the most recent failure, cleared by the next success.
    pub fn last_error(&self) -> Option<RemoteError> {
        self.last_error.read().clone()
    }

    fn record_url(&self, entity_type: &EntityType, entity_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, entity_type.as_str(), entity_id)
    }

    async fn execute(&self, method: Method, url: String, body: Option<Vec<u8>>) -> Result<(), RemoteError> {
        let request = HttpRequest {
            method,
            url,
            bearer: self.bearer.clone(),
            body,
        };

        let result = match self.client.send(request).await {
            Ok(response) => match status_error(&response) {
                Some(error) => Err(error),
                None => Ok(()),
            },
            Err(TransportError::Timeout) => Err(RemoteError::Timeout),
            Err(TransportError::Connect(message)) => Err(RemoteError::Network(message)),
        };

        *self.last_error.write() = result.as_ref().err().cloned();
        result
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpRemote<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Maps a non-success response onto a [`RemoteError`].
pub fn status_error(response: &HttpResponse) -> Option<RemoteError> {
    let message = || String::from_utf8_lossy(&response.body).into_owned();
    let error = match response.status {
        200..=299 => return None,
        400 | 422 => RemoteError::Rejected(message()),
        401 => RemoteError::Unauthorized(message()),
        403 => RemoteError::Forbidden(message()),
        404 | 410 => RemoteError::NotFound(message()),
        408 => RemoteError::Timeout,
        409 | 412 => RemoteError::Conflict {
            message: format!("remote rejected write with status {}", response.status),
            remote: (!response.body.is_empty()).then(|| response.body.clone()),
        },
        status @ 500..=599 => RemoteError::Server {
            status,
            message: message(),
        },
        status => RemoteError::Other(format!("unexpected status {status}: {}", message())),
    };
    Some(error)
}

#[async_trait]
impl<C: HttpClient> RemoteStore for HttpRemote<C> {
    async fn upsert(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
        payload: &[u8],
    ) -> Result<(), RemoteError> {
        let url = self.record_url(entity_type, entity_id);
        self.execute(Method::Put, url, Some(payload.to_vec())).await
    }

    async fn delete(&self, entity_type: &EntityType, entity_id: &str) -> Result<(), RemoteError> {
        let url = self.record_url(entity_type, entity_id);
        self.execute(Method::Delete, url, None).await
    }

    async fn check(&self) -> Result<(), RemoteError> {
        let url = format!("{}/health", self.base_url);
        self.execute(Method::Get, url, None).await
    }
}
