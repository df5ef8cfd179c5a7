//! HTTP layer for opening streaming chat requests
//!
//! This module implements the transport seam of the consumer:
//! - [`StreamTransport`], the trait the consumer opens streams through
//! - [`client::HttpClient`], the reqwest-backed implementation
//! - Error mapping for non-2xx responses and failed reads

pub mod client;
pub mod error;

pub use client::HttpClient;
pub use error::{map_http_error, TransportError};

use crate::config::SecretString;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

/// Response body as it arrives from the network
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Everything a transport needs to open one stream
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Unique request ID for correlation
    pub request_id: Uuid,

    /// Fully resolved endpoint URL
    pub url: String,

    /// JSON body to POST
    pub body: serde_json::Value,

    /// Sent as `Authorization: Bearer <token>` when present
    pub bearer: Option<SecretString>,
}

/// Opens a POST request and hands back its streaming body
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Send the request and return the body stream once a 2xx status arrived
    async fn open(&self, request: OpenRequest) -> Result<ByteStream, TransportError>;
}
