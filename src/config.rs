use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Conversion run configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct RunConfig {
    /// Target schema every table and user-defined-function reference is
    /// qualified with
    #[validate(length(min = 1, message = "Target schema cannot be empty"))]
    pub schema: String,

    /// Whether to emit full conversion results as JSON instead of plain
    /// statements
    pub emit_json: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            emit_json: false,
        }
    }
}

impl RunConfig {
    /// Create configuration from CLI arguments with validation
    pub fn from_cli(schema: String, emit_json: bool) -> Result<Self, ConfigError> {
        let config = Self { schema, emit_json };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            schema: env::var("JETBRIDGE_SCHEMA").unwrap_or_else(|_| "public".to_string()),
            emit_json: parse_env_var("JETBRIDGE_EMIT_JSON", "false")?,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default, attributing failures to
/// the variable name
fn parse_env_var<T>(var_name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(var_name).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: var_name.to_string(),
        value,
        source: Box::new(e),
    })
}
