use std::path::PathBuf;
use std::time::Duration;

use quantdash_channel::reconnect::{DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_RECONNECT_DELAY};
use quantdash_channel::ChannelConfig;
use quantdash_notifications::DEFAULT_POLL_INTERVAL;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_STATE_DIR: &str = ".quantdash";
const STATE_FILE_NAME: &str = "state.json";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration loaded from environment variables.
///
/// Every field has a default suitable for a local backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base HTTP URL of the analysis backend.
    pub api_url: String,
    /// Base WebSocket URL. Derived from `api_url` when unset.
    pub ws_url: String,
    pub keep_alive_interval: Duration,
    pub reconnect_delay: Duration,
    /// Upper bound on every HTTP request to the backend.
    pub request_timeout: Duration,
    /// Interval between background update checks.
    pub poll_interval: Duration,
    /// Directory holding the persisted client state.
    pub state_dir: PathBuf,
}

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default                        |
    /// |------------------------|--------------------------------|
    /// | `QUANTDASH_API_URL`    | `http://localhost:8000`        |
    /// | `QUANTDASH_WS_URL`     | API URL with a `ws(s)` scheme  |
    /// | `KEEP_ALIVE_SECS`      | `30`                           |
    /// | `RECONNECT_DELAY_SECS` | `5`                            |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                           |
    /// | `POLL_INTERVAL_SECS`   | `300`                          |
    /// | `STATE_DIR`            | `.quantdash`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_url = get("QUANTDASH_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.into())
            .trim_end_matches('/')
            .to_string();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "QUANTDASH_API_URL",
                value: api_url,
                expected: "an http(s) URL",
            });
        }

        let ws_url = match get("QUANTDASH_WS_URL") {
            Some(url) if url.starts_with("ws://") || url.starts_with("wss://") => {
                url.trim_end_matches('/').to_string()
            }
            Some(url) => {
                return Err(ConfigError::Invalid {
                    var: "QUANTDASH_WS_URL",
                    value: url,
                    expected: "a ws(s) URL",
                })
            }
            None => ws_url_from_api(&api_url),
        };

        let keep_alive_interval = secs_var(
            "KEEP_ALIVE_SECS",
            get("KEEP_ALIVE_SECS"),
            DEFAULT_KEEP_ALIVE_INTERVAL,
        )?;
        let reconnect_delay = secs_var(
            "RECONNECT_DELAY_SECS",
            get("RECONNECT_DELAY_SECS"),
            DEFAULT_RECONNECT_DELAY,
        )?;
        let request_timeout = secs_var(
            "REQUEST_TIMEOUT_SECS",
            get("REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT,
        )?;
        let poll_interval = secs_var(
            "POLL_INTERVAL_SECS",
            get("POLL_INTERVAL_SECS"),
            DEFAULT_POLL_INTERVAL,
        )?;

        let state_dir = get("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        Ok(Self {
            api_url,
            ws_url,
            keep_alive_interval,
            reconnect_delay,
            request_timeout,
            poll_interval,
            state_dir,
        })
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            keep_alive_interval: self.keep_alive_interval,
            reconnect_delay: self.reconnect_delay,
        }
    }

    /// File backing the persisted stores.
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }
}

/// Positive whole seconds, or the default when unset.
fn secs_var(
    var: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            expected: "a positive number of seconds",
        }),
    }
}

fn ws_url_from_api(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}
