//! HTTP client implementation using reqwest

use crate::config::ConnectionConfig;
use crate::http::error::map_http_error;
use crate::http::{ByteStream, OpenRequest, StreamTransport, TransportError};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shared HTTP client with connection pooling
#[derive(Clone)]
pub struct HttpClient {
    /// The underlying reqwest client
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, TransportError> {
        Self::from_config(&ConnectionConfig::default())
    }

    /// Create a new HTTP client from connection settings.
    ///
    /// No overall request timeout is set: the body streams for as long as the
    /// backend keeps writing, and callers bound it through cancellation.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_millis(config.pool_idle_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .build()
            .map_err(|e| TransportError::Other {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client: Arc::new(client),
        })
    }
}

#[async_trait]
impl StreamTransport for HttpClient {
    async fn open(&self, request: OpenRequest) -> Result<ByteStream, TransportError> {
        let request_id = request.request_id;

        info!("Opening chat stream [request_id: {}]", request_id);
        debug!("Request URL: {}", request.url);

        let mut req_builder = self
            .client
            .post(&request.url)
            .header(ACCEPT, "text/plain, application/x-ndjson, */*")
            .header("X-Request-ID", request_id.to_string())
            .json(&request.body);

        if let Some(ref bearer) = request.bearer {
            req_builder = req_builder.header(
                AUTHORIZATION,
                format!("Bearer {}", bearer.expose_secret()),
            );
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!("Connect timeout [request_id: {}]", request_id);
            } else {
                error!("Request error [request_id: {}]: {}", request_id, e);
            }
            TransportError::from(e)
        })?;

        let status = response.status();
        debug!("Response status: {} [request_id: {}]", status, request_id);

        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(map_http_error(status, body, request_id));
        }

        if let Some(content_type) = response.headers().get("content-type") {
            debug!(
                "Streaming body with content-type {:?} [request_id: {}]",
                content_type, request_id
            );
        }

        let stream = response.bytes_stream().map_err(move |e| {
            warn!("Body read failed [request_id: {}]: {}", request_id, e);
            TransportError::Read {
                message: e.to_string(),
            }
        });

        Ok(Box::pin(stream))
    }
}
