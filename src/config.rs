//! Configuration types for deploy-mirror

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level configuration for a [`TreeDownloader`](crate::TreeDownloader)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Deployment API access
    pub api: ApiConfig,

    /// Download behavior (concurrency, failure policy, deadline)
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry behavior for file and tree requests
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Config with default settings and the given access token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                token: token.into(),
                ..ApiConfig::default()
            },
            ..Default::default()
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.api.token.trim().is_empty() {
            return Err(Error::config("api.token", "access token must not be empty"));
        }
        url::Url::parse(&self.api.api_url).map_err(|e| {
            Error::config("api.api_url", format!("invalid API url '{}': {e}", self.api.api_url))
        })?;
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::config(
                "download.max_concurrent_downloads",
                "at least one concurrent download is required",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "retry.max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 || self.retry.exhaustion_backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff multipliers must be >= 1.0",
            ));
        }
        Ok(())
    }
}

/// Deployment API connection settings
///
/// Passed explicitly to [`ApiClient`](crate::client::ApiClient); there is no
/// process-wide HTTP client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the deployment API (default: "https://api.vercel.com")
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub token: String,

    /// Team scope, sent as the `teamId` query parameter when present
    #[serde(default)]
    pub team_id: Option<String>,

    /// Whole-request timeout (default: 180 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Connect timeout (default: 60 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: String::new(),
            team_id: None,
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// What a permanently failed file means for the run as a whole
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Finish the walk and list failures in the report (default)
    #[default]
    Report,
    /// Finish the walk, then fail with [`Error::Incomplete`] if any file failed
    FailRun,
}

/// Download behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum simultaneous file downloads, also the dispatch chunk size (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Effect of per-file terminal failures on the run result
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Deadline for a whole run; the run is cancelled when it elapses (default: none)
    #[serde(default, with = "optional_duration_serde")]
    pub run_timeout: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            failure_policy: FailurePolicy::default(),
            run_timeout: None,
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per request, including the first (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 300 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for network, server and rate-limit failures (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Multiplier after a storage-exhaustion response (default: 4.0)
    #[serde(default = "default_exhaustion_backoff_multiplier")]
    pub exhaustion_backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            exhaustion_backoff_multiplier: default_exhaustion_backoff_multiplier(),
            jitter: false,
        }
    }
}

fn default_api_url() -> String {
    "https://api.vercel.com".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_concurrent() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_exhaustion_backoff_multiplier() -> f64 {
    4.0
}

// Duration serialization helper (as whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
