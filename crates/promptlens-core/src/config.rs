// Stream configuration
//
// Loaded from the environment at startup and validated before anything
// binds a socket; an inconsistent combination (timeout not exceeding the
// heartbeat interval, oversized replay buffer) is a startup error.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Hard ceiling on the replay buffer; larger windows belong in the store
pub const MAX_REPLAY_EVENTS_CEILING: usize = 256;

const DEFAULT_MAX_CONNECTIONS_PER_IP: usize = 10;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETRY_INTERVAL_MS: u64 = 3000;
const DEFAULT_MAX_REPLAY_EVENTS: usize = 100;

/// Runtime configuration for the streaming side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Concurrent SSE connections allowed per client IP
    pub max_connections_per_ip: usize,
    /// Cadence of heartbeat events, independent of traffic
    pub heartbeat_interval: Duration,
    /// Idle window after which a connection is force-disconnected.
    /// Must be strictly greater than the heartbeat interval.
    pub connection_timeout: Duration,
    /// Fixed reconnect delay; also sent as the SSE `retry:` hint
    pub retry_interval: Duration,
    /// Capacity of the replay ring buffer, 0-256
    pub max_replay_events: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_connections_per_ip: DEFAULT_MAX_CONNECTIONS_PER_IP,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            connection_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            max_replay_events: DEFAULT_MAX_REPLAY_EVENTS,
        }
    }
}

impl StreamConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Fails fast on unparseable values or
    /// invalid combinations.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            max_connections_per_ip: env_parse(
                "MAX_CONNECTIONS_PER_IP",
                DEFAULT_MAX_CONNECTIONS_PER_IP,
            )?,
            heartbeat_interval: Duration::from_secs(env_parse(
                "HEARTBEAT_INTERVAL_SECS",
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            )?),
            connection_timeout: Duration::from_secs(env_parse(
                "CONNECTION_TIMEOUT_SECS",
                DEFAULT_CONNECTION_TIMEOUT_SECS,
            )?),
            retry_interval: Duration::from_millis(env_parse(
                "RETRY_INTERVAL_MS",
                DEFAULT_RETRY_INTERVAL_MS,
            )?),
            max_replay_events: env_parse("MAX_REPLAY_EVENTS", DEFAULT_MAX_REPLAY_EVENTS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants between the individual settings
    pub fn validate(&self) -> Result<()> {
        if self.max_connections_per_ip == 0 {
            return Err(Error::config("MAX_CONNECTIONS_PER_IP must be at least 1"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("HEARTBEAT_INTERVAL_SECS must be at least 1"));
        }
        if self.connection_timeout <= self.heartbeat_interval {
            return Err(Error::config(format!(
                "CONNECTION_TIMEOUT_SECS ({:?}) must exceed HEARTBEAT_INTERVAL_SECS ({:?})",
                self.connection_timeout, self.heartbeat_interval
            )));
        }
        if self.retry_interval.is_zero() {
            return Err(Error::config("RETRY_INTERVAL_MS must be at least 1"));
        }
        if self.max_replay_events > MAX_REPLAY_EVENTS_CEILING {
            return Err(Error::config(format!(
                "MAX_REPLAY_EVENTS must be at most {MAX_REPLAY_EVENTS_CEILING}, got {}",
                self.max_replay_events
            )));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{key} is not valid: {raw:?}"))),
    }
}
