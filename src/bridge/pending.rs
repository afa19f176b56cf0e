//! Pending call: one outstanding request to the co-processor.
//!
//! Construction does no I/O. The request goes out, and its response is
//! awaited, exactly once: on the first result request, or on drop if the
//! result was never asked for. That makes a discarded call a
//! fire-and-forget notification that still happens, not one that silently
//! never does.
//!
//! ```text
//!  call() ──▶ [not executed] ──result()/drop──▶ [executed, outcome recorded]
//!                                                  │
//!                         result() again ──────────┘──▶ same outcome, no I/O
//! ```
//!
//! Concurrent result requests on a shared call block until the one that
//! executes has recorded its outcome, then all see that outcome.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::time::Instant;

use log::{debug, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use super::Bridge;
use super::channel::LockError;
use crate::error::{CallError, CodecError, RpcError, TransportError};
use crate::rpc::message::{MsgId, Response, decode_value};

/// How a call treats bridge readiness and response waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallMode {
    /// Application call: fails fast on a not-ready bridge, bounded wait.
    Application(Option<Duration>),
    /// Lifecycle call issued while the bridge is still starting.
    Lifecycle(Option<Duration>),
}

impl CallMode {
    fn requires_ready(self) -> bool {
        matches!(self, Self::Application(_))
    }

    fn timeout(self) -> Option<Duration> {
        match self {
            Self::Application(t) | Self::Lifecycle(t) => t,
        }
    }
}

/// A remote call that has been built but not necessarily sent.
pub struct PendingCall {
    bridge: Bridge,
    method: String,
    params: Result<Vec<u8>, CodecError>,
    mode: CallMode,
    executed: AtomicBool,
    error: Mutex<RpcError>,
    /// Raw result bytes or failure of the single execution.
    outcome: Mutex<Option<Result<Vec<u8>, CallError>>>,
}

impl PendingCall {
    pub(crate) fn new(
        bridge: Bridge,
        method: &str,
        params: Result<Vec<u8>, CodecError>,
        mode: CallMode,
    ) -> Self {
        Self {
            bridge,
            method: method.to_owned(),
            params,
            mode,
            executed: AtomicBool::new(false),
            error: Mutex::new(RpcError::not_executed()),
            outcome: Mutex::new(None),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Send the call and wait for its result.
    ///
    /// Only the first request (across all threads sharing this call) does
    /// any I/O. Every later request returns the first outcome again.
    pub fn result<T: DeserializeOwned>(&self) -> Result<T, CallError> {
        let mut slot = self.outcome.lock();
        let raw = slot.get_or_insert_with(|| {
            self.executed.store(true, Ordering::Release);
            self.execute()
        });

        let outcome = match &*raw {
            Ok(bytes) => decode_value::<T>(bytes).map_err(CallError::from),
            Err(e) => Err(e.clone()),
        };
        *self.error.lock() = match &outcome {
            Ok(_) => RpcError::none(),
            Err(e) => e.to_record(),
        };
        outcome
    }

    /// Consuming form of [`result`](Self::result).
    pub fn wait<T: DeserializeOwned>(self) -> Result<T, CallError> {
        self.result()
    }

    /// `true` once the call has completed without error.
    pub fn is_ok(&self) -> bool {
        self.executed.load(Ordering::Acquire) && self.error.lock().is_ok()
    }

    pub fn is_executed(&self) -> bool {
        self.executed.load(Ordering::Acquire)
    }

    /// The last known error record (`NO_ERR` on success).
    pub fn error(&self) -> RpcError {
        self.error.lock().clone()
    }

    fn execute(&self) -> Result<Vec<u8>, CallError> {
        let params = self.params.clone()?;
        if self.mode.requires_ready() && !self.bridge.is_ready() {
            return Err(CallError::NotReady);
        }

        let channel = &self.bridge.shared.channel;
        let msgid = channel.with_writer(|w| w.send_request(&self.method, params))??;
        debug!("BRIDGE: '{}' sent as #{}", self.method, msgid);

        let response = self.await_response(msgid)?;
        if response.error.is_ok() {
            Ok(response.result)
        } else {
            Err(CallError::Remote(response.error))
        }
    }

    fn await_response(&self, msgid: MsgId) -> Result<Response, CallError> {
        let channel = &self.bridge.shared.channel;
        let deadline = self.mode.timeout().map(|t| Instant::now() + t);

        loop {
            match channel.acquire_read(channel.lock_timeout()) {
                Ok(mut reader) => match reader.try_receive_response(msgid) {
                    Ok(Some(resp)) => return Ok(resp),
                    Ok(None) => {}
                    Err(e) => {
                        reader.abandon(msgid);
                        return Err(e.into());
                    }
                },
                Err(LockError::NotOpen) => return Err(TransportError::NotOpen.into()),
                Err(LockError::Timeout) => {}
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("BRIDGE: '{}' #{} timed out", self.method, msgid);
                let _ = channel.with_reader(|r| r.abandon(msgid));
                return Err(CallError::Timeout);
            }
            channel.back_off();
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.executed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.execute() {
            debug!("BRIDGE: discarded call '{}' failed: {}", self.method, e);
        }
    }
}
