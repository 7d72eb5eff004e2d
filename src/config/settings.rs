use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Base address of the dashboard backend; topic endpoints hang off
    /// `{base_url}/ws/{topic}`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Keep-alive ping interval in seconds while connected
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// First retry delay in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Ceiling on the exponential backoff in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Retry budget before the manager stays disconnected
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Multiplicative jitter (0.0 disables it)
    #[serde(default)]
    pub jitter_factor: f64,
}

fn default_base_url() -> String {
    "ws://127.0.0.1:8081".to_string()
}

fn default_keepalive_interval() -> u64 {
    30 // 30 seconds
}

fn default_base_delay() -> u64 {
    1000 // 1 second
}

fn default_max_delay() -> u64 {
    30_000 // 30 seconds
}

fn default_max_attempts() -> u32 {
    5
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("stream.base_url", default_base_url())?
            .set_default("stream.keepalive_interval_secs", 30)?
            .set_default("reconnect.base_delay_ms", 1000)?
            .set_default("reconnect.max_delay_ms", 30_000)?
            .set_default("reconnect.max_attempts", 5)?
            .set_default("reconnect.jitter_factor", 0.0)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // STREAM__BASE_URL, RECONNECT__MAX_ATTEMPTS, etc. A single
            // underscore would split multi-word keys like base_url apart.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            keepalive_interval_secs: default_keepalive_interval(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            jitter_factor: 0.0,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}
