//! RouterBridge library.
//!
//! Lets code on the MCU call services on the co-processor (and serve calls
//! from it) over one shared UART, from any thread. All ESP-IDF-specific
//! code is guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod proxies;
pub mod rpc;
pub mod task;

pub mod adapters;

pub use bridge::{Bridge, BridgeState, DispatchOutcome, PendingCall, SafeUpdater};
pub use config::BridgeConfig;
pub use error::{BridgeError, CallError, Error, Result, RpcError};
