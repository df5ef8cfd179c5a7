//! Configuration validation utilities

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::ClientConfig;
use regex::Regex;
use tracing::warn;

/// Configuration validator with rules beyond the schema's own checks
pub struct ConfigValidator {
    /// Shape of a JSON field name the sentinel may point at
    field_name_pattern: Regex,
    /// Hosts for which plaintext HTTP is acceptable
    local_host_pattern: Regex,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self {
            field_name_pattern: Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$")
                .expect("static regex"),
            local_host_pattern: Regex::new(r"^(localhost|127\.0\.0\.1|\[::1\]|0\.0\.0\.0)$")
                .expect("static regex"),
        }
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &ClientConfig) -> Result<(), ValidationError> {
        config.validate()?;

        self.validate_base_url(config)?;
        self.validate_sentinel(config)?;

        Ok(())
    }

    /// The base URL is joined with paths, so it cannot carry a query or fragment
    fn validate_base_url(&self, config: &ClientConfig) -> Result<(), ValidationError> {
        let url = url::Url::parse(&config.endpoint.base_url).map_err(|e| {
            ValidationError::new(
                "endpoint.base_url",
                ValidationErrorKind::InvalidUrl {
                    message: e.to_string(),
                },
            )
        })?;

        if url.query().is_some() || url.fragment().is_some() {
            return Err(ValidationError::new(
                "endpoint.base_url",
                ValidationErrorKind::InvalidUrl {
                    message: "base URL must not contain a query or fragment".to_string(),
                },
            ));
        }

        // Bearer tokens travel in headers; flag plaintext HTTP to remote hosts
        let host = url.host_str().unwrap_or("");
        if url.scheme() == "http" && !self.local_host_pattern.is_match(host) {
            warn!(
                "Base URL {} uses plaintext HTTP; bearer credentials will not be encrypted",
                config.endpoint.base_url
            );
        }

        Ok(())
    }

    fn validate_sentinel(&self, config: &ClientConfig) -> Result<(), ValidationError> {
        let field = &config.protocol.guest_rate_limit.field;
        if !self.field_name_pattern.is_match(field) {
            return Err(ValidationError::invalid_format(
                "protocol.guest_rate_limit.field",
                format!("'{}' is not a valid JSON field name", field),
            )
            .with_context("The sentinel is matched against a top-level field of the error payload"));
        }

        Ok(())
    }
}
