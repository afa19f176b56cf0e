//! Bridge configuration parameters
//!
//! All tunable parameters for the link and the bridge's locking discipline.
//! Values can be loaded from a JSON document (provisioning) or stored in
//! flash as postcard bytes.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    // --- Link ---
    /// UART baud rate used when `begin` opens the transport
    pub baud_rate: u32,

    // --- Locking ---
    /// Bounded wait for a channel lock before yielding and retrying (ms)
    pub lock_timeout_ms: u32,
    /// Sleep between read-path polls and after a failed lock attempt (ms)
    pub poll_interval_ms: u32,

    // --- Handshake ---
    /// How long `begin` waits for the co-processor's readiness signal (ms)
    pub handshake_timeout_ms: u32,

    // --- Calls ---
    /// Upper bound on a call's response wait (ms); `None` waits forever
    pub call_timeout_ms: Option<u32>,
    /// Inbound requests buffered before new ones are dropped
    pub request_queue_depth: u16,

    // --- Dispatch thread ---
    /// Core the background dispatch thread is pinned to (0 or 1)
    pub dispatch_core: u8,
    /// FreeRTOS priority of the dispatch thread
    pub dispatch_priority: u8,
    /// Stack size of the dispatch thread (KiB)
    pub dispatch_stack_kb: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            // Link
            baud_rate: 115_200,

            // Locking
            lock_timeout_ms: 10,
            poll_interval_ms: 1,

            // Handshake
            handshake_timeout_ms: 3_000,

            // Calls
            call_timeout_ms: Some(10_000),
            request_queue_depth: 16,

            // Dispatch thread
            dispatch_core: 0,
            dispatch_priority: 5,
            dispatch_stack_kb: 16,
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the bridge unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::ValidationFailed("baud_rate"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("lock_timeout_ms"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("poll_interval_ms"));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationFailed("call_timeout_ms"));
        }
        if self.request_queue_depth == 0 {
            return Err(ConfigError::ValidationFailed("request_queue_depth"));
        }
        if self.dispatch_core > 1 {
            return Err(ConfigError::ValidationFailed("dispatch_core"));
        }
        if self.dispatch_stack_kb < 2 {
            return Err(ConfigError::ValidationFailed("dispatch_stack_kb"));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.lock_timeout_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.handshake_timeout_ms))
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms
            .map(|ms| Duration::from_millis(u64::from(ms)))
    }
}
