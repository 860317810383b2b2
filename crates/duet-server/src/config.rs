//! Server configuration: defaults, JSON config file, `DUET_*` environment
//! overrides, in that order.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for this schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// An environment override holds a value the field cannot parse.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// Environment variable name.
        var: String,
        /// The offending value.
        value: String,
    },
    /// A field combination that cannot run.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the duet server.
///
/// Every field has a default, so a config file may name only the fields it
/// changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Seconds an unauthenticated connection may sit before eviction.
    pub auth_timeout_secs: u64,
    /// Interval between server-initiated Ping frames, in seconds.
    pub ping_interval_secs: u64,
    /// Outbound queue depth per connection.
    pub outbound_buffer: usize,
    /// Dropped messages tolerated before a slow client is disconnected.
    pub max_dropped_messages: u64,
    /// Largest accepted `WebSocket` frame, in bytes.
    pub max_frame_bytes: usize,
    /// Seconds to wait for sessions to drain on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9160,
            auth_timeout_secs: 10,
            ping_interval_secs: 30,
            outbound_buffer: 256,
            max_dropped_messages: 100,
            max_frame_bytes: 64 * 1024,
            shutdown_grace_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Load configuration: defaults, then the JSON file at `path` (if given),
    /// then `DUET_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DUET_*` overrides from an environment snapshot.
    pub fn apply_env(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (var, value) in vars {
            match var.as_str() {
                "DUET_HOST" => self.host = value,
                "DUET_PORT" => self.port = parse_env(&var, &value)?,
                "DUET_AUTH_TIMEOUT_SECS" => self.auth_timeout_secs = parse_env(&var, &value)?,
                "DUET_PING_INTERVAL_SECS" => self.ping_interval_secs = parse_env(&var, &value)?,
                "DUET_OUTBOUND_BUFFER" => self.outbound_buffer = parse_env(&var, &value)?,
                "DUET_MAX_DROPPED_MESSAGES" => {
                    self.max_dropped_messages = parse_env(&var, &value)?;
                }
                "DUET_MAX_FRAME_BYTES" => self.max_frame_bytes = parse_env(&var, &value)?,
                "DUET_SHUTDOWN_GRACE_SECS" => self.shutdown_grace_secs = parse_env(&var, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject field values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.auth_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "authTimeoutSecs must be at least 1".into(),
            ));
        }
        if self.ping_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "pingIntervalSecs must be at least 1".into(),
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid(
                "outboundBuffer must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Auth window as a [`Duration`].
    #[must_use]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    /// Ping interval as a [`Duration`].
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Shutdown grace as a [`Duration`].
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_env<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_owned(),
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_bind_address() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 9160);
    }

    #[test]
    fn default_auth_window() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.auth_timeout_secs, 10);
        assert_eq!(cfg.auth_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn default_queue_and_frame_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.outbound_buffer, 256);
        assert_eq!(cfg.max_dropped_messages, 100);
        assert_eq!(cfg.max_frame_bytes, 64 * 1024);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 7000, "authTimeoutSecs": 3}}"#).unwrap();

        let cfg = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.auth_timeout_secs, 3);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.ping_interval_secs, 30);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = ServerConfig::load(Some(Path::new("/nonexistent/duet.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let err = ServerConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = ServerConfig {
            port: 7000,
            ..ServerConfig::default()
        };
        cfg.apply_env([
            ("DUET_PORT".to_owned(), "7001".to_owned()),
            ("DUET_HOST".to_owned(), "0.0.0.0".to_owned()),
            ("DUET_MAX_DROPPED_MESSAGES".to_owned(), "5".to_owned()),
        ])
        .unwrap();

        assert_eq!(cfg.port, 7001);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.max_dropped_messages, 5);
    }

    #[test]
    fn unrelated_env_vars_are_ignored() {
        let mut cfg = ServerConfig::default();
        cfg.apply_env([
            ("PATH".to_owned(), "/usr/bin".to_owned()),
            ("DUET_UNKNOWN".to_owned(), "whatever".to_owned()),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9160);
    }

    #[test]
    fn unparseable_env_value_is_an_error() {
        let mut cfg = ServerConfig::default();
        let err = cfg
            .apply_env([("DUET_PORT".to_owned(), "not-a-port".to_owned())])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn zero_auth_window_is_rejected() {
        let cfg = ServerConfig {
            auth_timeout_secs: 0,
            ..ServerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_outbound_buffer_is_rejected() {
        let cfg = ServerConfig {
            outbound_buffer: 0,
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.auth_timeout_secs, cfg.auth_timeout_secs);
        assert_eq!(back.shutdown_grace_secs, cfg.shutdown_grace_secs);
    }

    #[test]
    fn config_file_fields_are_camel_case() {
        let json = serde_json::to_value(ServerConfig::default()).unwrap();
        assert!(json.get("authTimeoutSecs").is_some());
        assert!(json.get("pingIntervalSecs").is_some());
        assert!(json.get("maxFrameBytes").is_some());
        assert!(json.get("auth_timeout_secs").is_none());
    }
}
