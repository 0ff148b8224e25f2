use crate::net::TcpTuning;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Listener that provides the bundle's address. Defaults to the first
    /// listener name in sorted order.
    #[serde(default)]
    pub main: Option<String>,
    pub listeners: HashMap<String, ListenerConfig>,
    #[serde(default)]
    pub service: ServiceConfig,
}

/// One endpoint. Exactly one of `bind` or `unix` must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub unix: Option<PathBuf>,
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
    #[serde(default)]
    pub send_buffer_size: Option<usize>,
    #[serde(default)]
    pub recv_buffer_size: Option<usize>,
}

fn default_nodelay() -> bool {
    true
}

impl ListenerConfig {
    pub fn tuning(&self) -> TcpTuning {
        TcpTuning {
            nodelay: self.nodelay,
            send_buffer_size: self.send_buffer_size,
            recv_buffer_size: self.recv_buffer_size,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Written to every client before echoing starts
    #[serde(default)]
    pub greeting: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file
    pub async fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_string())
            } else {
                ConfigError::IoError(e.to_string())
            }
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML string (useful for testing)
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for common errors
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listeners.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one listener must be configured".to_string(),
            ));
        }

        for (name, listener) in &self.listeners {
            match (&listener.bind, &listener.unix) {
                (Some(_), None) | (None, Some(_)) => {}
                (Some(_), Some(_)) => {
                    return Err(ConfigError::ValidationError(format!(
                        "Listener '{}' sets both 'bind' and 'unix'",
                        name
                    )));
                }
                (None, None) => {
                    return Err(ConfigError::ValidationError(format!(
                        "Listener '{}' needs either 'bind' or 'unix'",
                        name
                    )));
                }
            }
        }

        if let Some(main) = &self.main {
            if !self.listeners.contains_key(main) {
                return Err(ConfigError::ValidationError(format!(
                    "Main listener '{}' is not a configured listener",
                    main
                )));
            }
        }

        Ok(())
    }

    /// Name of the listener that provides the bundle's address
    pub fn main_listener(&self) -> Option<&str> {
        match &self.main {
            Some(main) => Some(main.as_str()),
            None => self.listeners.keys().min().map(String::as_str),
        }
    }

    /// Listener names in a stable order
    pub fn listener_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.listeners.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
