//! Environment variable interpolation for configuration

use super::error::ConfigError;
use super::schema::ClientConfig;
use regex::Regex;
use std::env;

fn env_var_pattern() -> Regex {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex")
}

/// Interpolate `${VAR}` references in a configuration document
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let pattern = env_var_pattern();
    let mut result = content.to_string();

    for cap in pattern.captures_iter(content) {
        let var_name = &cap[1];
        let value = env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound {
            var: var_name.to_string(),
        })?;
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}

/// Interpolate fields of an already parsed config that may still hold placeholders
/// (e.g. values introduced by a variable that itself expanded to `${OTHER}`)
pub fn interpolate_config_env_vars(config: &mut ClientConfig) -> Result<(), ConfigError> {
    let pattern = env_var_pattern();

    if pattern.is_match(&config.endpoint.base_url) {
        config.endpoint.base_url = interpolate_single_value(&pattern, &config.endpoint.base_url)?;
    }

    if pattern.is_match(&config.connection.user_agent) {
        config.connection.user_agent =
            interpolate_single_value(&pattern, &config.connection.user_agent)?;
    }

    Ok(())
}

fn interpolate_single_value(pattern: &Regex, value: &str) -> Result<String, ConfigError> {
    let mut result = value.to_string();
    for cap in pattern.captures_iter(value) {
        let var_name = &cap[1];
        match env::var(var_name) {
            Ok(env_value) => result = result.replace(&cap[0], &env_value),
            Err(_) => {
                return Err(ConfigError::EnvVarNotFound {
                    var: var_name.to_string(),
                })
            }
        }
    }
    Ok(result)
}
