//! Configuration loading for the binaries.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. `config/consumer.{toml,yaml,json}` if present
//! 3. the file named by `SQS_CONSUMER_CONFIG`, which must exist when set
//! 4. environment variables prefixed `SQS_CONSUMER` with `__` as the
//!    separator, e.g. `SQS_CONSUMER__QUEUE__URL`

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::errors::ConsumerError;
use crate::receiver::ReceiverConfig;
use crate::retry::RetryPolicy;

pub const CONFIG_PATH_ENV: &str = "SQS_CONSUMER_CONFIG";
pub const ENV_PREFIX: &str = "SQS_CONSUMER";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub url: String,
    pub dead_letter_url: Option<String>,
    pub region: Option<String>,
    /// Alternate endpoint such as LocalStack.
    pub endpoint_url: Option<String>,
    /// Static credentials; both or neither. Unset means the default AWS
    /// provider chain (environment, profile, instance role).
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub max_messages: i32,
    pub wait_time_seconds: i32,
    pub max_in_flight: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            url: String::new(),
            dead_letter_url: None,
            region: None,
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            max_messages: 10,
            wait_time_seconds: 20,
            max_in_flight: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    pub grace_period_secs: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        ShutdownSettings { grace_period_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 8,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            port: 8080,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads settings from the standard sources without validating them.
    pub fn load() -> Result<Self, ConsumerError> {
        let mut builder = Config::builder().add_source(File::with_name("config/consumer").required(false));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                builder = builder.add_source(File::with_name(&path).required(true));
            }
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()
            .map_err(|err| ConsumerError::Configuration(err.to_string()))?;

        Self::from_config(config)
    }

    /// Deserializes an already assembled [`Config`]. Callers validate the
    /// sections they need.
    pub fn from_config(config: Config) -> Result<Self, ConsumerError> {
        config
            .try_deserialize()
            .map_err(|err| ConsumerError::Configuration(err.to_string()))
    }

    /// Checks the settings the worker needs. The HTTP binary only needs the
    /// `http` and `shutdown` sections and calls [`Settings::validate_http`].
    pub fn validate(&self) -> Result<(), ConsumerError> {
        self.validate_http()?;
        if self.queue.url.trim().is_empty() {
            return Err(ConsumerError::Configuration("queue.url must be set".to_string()));
        }
        if self.queue.max_in_flight == 0 {
            return Err(ConsumerError::Configuration(
                "queue.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.queue.wait_time_seconds < 0 {
            return Err(ConsumerError::Configuration(
                "queue.wait_time_seconds must not be negative".to_string(),
            ));
        }
        match (&self.queue.access_key_id, &self.queue.secret_access_key) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConsumerError::Configuration(
                    "queue.access_key_id and queue.secret_access_key must be set together".to_string(),
                ));
            }
            (Some(_), Some(_)) if self.queue.region.is_none() => {
                return Err(ConsumerError::Configuration(
                    "queue.region is required with static credentials".to_string(),
                ));
            }
            _ => {}
        }
        if self.queue.dead_letter_url.as_deref() == Some(self.queue.url.as_str()) {
            return Err(ConsumerError::Configuration(
                "queue.dead_letter_url must differ from queue.url".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_http(&self) -> Result<(), ConsumerError> {
        if self.http.request_timeout_secs == 0 {
            return Err(ConsumerError::Configuration(
                "http.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `(access_key_id, secret_access_key)` when static credentials are configured.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.queue.access_key_id, &self.queue.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                Some((access_key_id.as_str(), secret_access_key.as_str()))
            }
            _ => None,
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_period_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.multiplier,
        )
    }

    pub fn receiver_config(&self) -> ReceiverConfig {
        let mut config = ReceiverConfig::new(self.queue.url.clone())
            .with_batch(self.queue.max_messages, self.queue.wait_time_seconds)
            .with_max_in_flight(self.queue.max_in_flight)
            .with_shutdown_grace_period(self.grace_period())
            .with_retry(self.retry_policy());
        if let Some(dead_letter_url) = &self.queue.dead_letter_url {
            config = config.with_dead_letter_queue(dead_letter_url.clone());
        }
        config
    }
}
