use crate::error::{Result, StreamError};
use crate::streaming::assembler::is_tag_name;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;

pub const DEFAULT_ENDPOINT: &str = "https://vera-assignment-api.vercel.app/api/stream";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub sections: SectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Streaming endpoint, without the query parameter
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the query string parameter carrying the question
    #[serde(default = "default_query_param")]
    pub query_param: String,
    /// Connect timeout and maximum silence between body reads
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionConfig {
    /// Display titles per tag name, layered over the built-in ones
    #[serde(default)]
    pub titles: HashMap<String, String>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_query_param() -> String {
    "prompt".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            query_param: default_query_param(),
            timeout_secs: default_timeout_secs(),
            headers: HashMap::new(),
        }
    }
}

impl StreamConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let endpoint = env::var("SECTION_STREAM_ENDPOINT").unwrap_or_else(|_| default_endpoint());

        let query_param =
            env::var("SECTION_STREAM_QUERY_PARAM").unwrap_or_else(|_| default_query_param());

        let timeout_secs = env::var("SECTION_STREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| default_timeout_secs().to_string())
            .parse::<u64>()
            .map_err(|e| StreamError::ConfigError(format!("Invalid timeout value: {}", e)))?;

        Ok(StreamConfig {
            client: ClientConfig {
                endpoint,
                query_param,
                timeout_secs,
                headers: HashMap::new(),
            },
            sections: SectionConfig::default(),
        })
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| StreamError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Allow environment variables to override file config
        if let Ok(endpoint) = env::var("SECTION_STREAM_ENDPOINT") {
            config.client.endpoint = endpoint;
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| StreamError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.client.endpoint.is_empty() {
            return Err(StreamError::ConfigError("Endpoint is empty".to_string()));
        }

        if self.client.query_param.is_empty() {
            return Err(StreamError::ConfigError(
                "Query parameter name is empty".to_string(),
            ));
        }

        if self.client.timeout_secs == 0 {
            return Err(StreamError::ConfigError(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(tag) = self
            .sections
            .titles
            .keys()
            .find(|tag| !is_tag_name(tag))
        {
            return Err(StreamError::ConfigError(format!(
                "Invalid tag name in titles: {:?}",
                tag
            )));
        }

        Ok(())
    }
}
