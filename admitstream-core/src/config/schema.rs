//! Configuration schema structures with serde support

use serde::{Deserialize, Serialize};
use super::error::{ValidationError, ValidationErrorKind};

/// Supported configuration schema version
pub const SCHEMA_VERSION: &str = "0.1";

/// Root configuration for the streaming chat client
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Where the chat backend lives
    pub endpoint: EndpointConfig,

    /// Connection pool and timeout settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Wire protocol knobs
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

impl ClientConfig {
    /// Build a configuration with defaults for everything except the base URL
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            endpoint: EndpointConfig {
                base_url: base_url.into(),
                chat_path: default_chat_path(),
                image_chat_path: default_image_chat_path(),
            },
            connection: ConnectionConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

/// Chat backend endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Base URL of the backend (supports environment variable interpolation)
    pub base_url: String,

    /// Path for text-only chat streams
    #[serde(default = "default_chat_path")]
    pub chat_path: String,

    /// Path for chat streams carrying an image attachment
    #[serde(default = "default_image_chat_path")]
    pub image_chat_path: String,
}

impl EndpointConfig {
    /// Full URL for a stream, picking the image endpoint when an attachment is sent
    pub fn stream_url(&self, with_image: bool) -> String {
        let path = if with_image {
            &self.image_chat_path
        } else {
            &self.chat_path
        };
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// How long idle pooled connections are kept, in milliseconds
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_ms: u64,

    /// Maximum idle connections per host
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            pool_idle_timeout_ms: default_pool_idle_timeout(),
            max_idle_per_host: default_max_idle(),
            user_agent: default_user_agent(),
        }
    }
}

/// Stream protocol configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Marker the backend puts in an error payload when a guest ran out of quota
    #[serde(default)]
    pub guest_rate_limit: GuestRateLimitSentinel,

    /// Longest record the decoder will buffer before giving up on the stream
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            guest_rate_limit: GuestRateLimitSentinel::default(),
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

/// Field/value pair identifying the guest rate-limit error
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GuestRateLimitSentinel {
    /// Top-level field of the error payload to inspect
    #[serde(default = "default_sentinel_field")]
    pub field: String,

    /// Value of that field that marks the guest quota condition
    #[serde(default = "default_sentinel_value")]
    pub value: String,
}

impl Default for GuestRateLimitSentinel {
    fn default() -> Self {
        Self {
            field: default_sentinel_field(),
            value: default_sentinel_value(),
        }
    }
}

impl GuestRateLimitSentinel {
    /// Whether a JSON error body carries the sentinel
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        payload
            .get(&self.field)
            .and_then(|v| v.as_str())
            .is_some_and(|v| v == self.value)
    }
}

// Default value functions for serde
fn default_chat_path() -> String { "/chat/stream".to_string() }
fn default_image_chat_path() -> String { "/chat/stream/image".to_string() }
fn default_connect_timeout() -> u64 { 10000 }
fn default_pool_idle_timeout() -> u64 { 90000 }
fn default_max_idle() -> usize { 10 }
fn default_user_agent() -> String { concat!("admitstream/", env!("CARGO_PKG_VERSION")).to_string() }
fn default_max_record_bytes() -> usize { 1024 * 1024 }
fn default_sentinel_field() -> String { "code".to_string() }
fn default_sentinel_value() -> String { "GUEST_RATE_LIMIT".to_string() }

impl ClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != SCHEMA_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: SCHEMA_VERSION.to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        self.endpoint.validate("endpoint")?;
        self.connection.validate("connection")?;
        self.protocol.validate("protocol")?;

        Ok(())
    }
}

impl EndpointConfig {
    /// Validate endpoint configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.base_url.is_empty() {
            return Err(ValidationError::required(format!("{}.base_url", path)));
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::new(
                        format!("{}.base_url", path),
                        ValidationErrorKind::InvalidUrl {
                            message: format!("URL scheme must be http or https, got: {}", url.scheme()),
                        },
                    ));
                }
            }
            Err(e) => {
                return Err(ValidationError::new(
                    format!("{}.base_url", path),
                    ValidationErrorKind::InvalidUrl {
                        message: e.to_string(),
                    },
                ));
            }
        }

        for (field, value) in [
            ("chat_path", &self.chat_path),
            ("image_chat_path", &self.image_chat_path),
        ] {
            if !value.starts_with('/') {
                return Err(ValidationError::invalid_format(
                    format!("{}.{}", path, field),
                    "Path must start with '/'",
                ));
            }
        }

        Ok(())
    }
}

impl ConnectionConfig {
    /// Validate connection configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.connect_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.connect_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ValidationError::required(format!("{}.user_agent", path)));
        }

        Ok(())
    }
}

impl ProtocolConfig {
    /// Validate protocol configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_record_bytes == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_record_bytes", path),
                "Must be greater than 0",
            ));
        }

        if self.guest_rate_limit.field.is_empty() {
            return Err(ValidationError::required(format!(
                "{}.guest_rate_limit.field",
                path
            )));
        }

        if self.guest_rate_limit.value.is_empty() {
            return Err(ValidationError::required(format!(
                "{}.guest_rate_limit.value",
                path
            )));
        }

        Ok(())
    }
}
