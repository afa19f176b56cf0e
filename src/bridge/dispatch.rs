//! Inbound request dispatch: background loop and safe-context hook.
//!
//! Both paths run the same single step:
//!
//! 1. bounded attempt at the read lock (busy → report and let the caller sleep)
//! 2. take the oldest request routed to this path's namespace
//! 3. release the read lock
//! 4. run the handler with no lock held (it may issue nested calls)
//! 5. send the response under the write lock (bounded retry)
//!
//! The background thread runs it forever for the `Normal` namespace. The
//! `Safe` namespace is only ever served through [`SafeUpdater`], which the
//! application's own loop holds.

use std::sync::Weak;
use std::thread;

use log::{debug, info, warn};

use super::channel::LockError;
use super::{Bridge, Shared};
use crate::rpc::server::Namespace;

/// What one dispatch step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A request was executed (and answered, unless it was a notification).
    Handled,
    /// Nothing queued for this namespace.
    Idle,
    /// The read lock stayed busy for the whole bounded wait.
    Busy,
}

pub(crate) fn dispatch_once(shared: &Shared, ns: Namespace) -> DispatchOutcome {
    let request = {
        let mut reader = match shared.channel.acquire_read(shared.channel.lock_timeout()) {
            Ok(r) => r,
            Err(LockError::Timeout) => return DispatchOutcome::Busy,
            Err(LockError::NotOpen) => return DispatchOutcome::Idle,
        };
        match reader.try_receive_request(|method| shared.handlers.route(method) == ns) {
            Ok(Some(req)) => req,
            Ok(None) => return DispatchOutcome::Idle,
            Err(e) => {
                warn!("BRIDGE: inbound read failed: {}", e);
                return DispatchOutcome::Idle;
            }
        }
    };

    debug!("BRIDGE[{:?}]: dispatching '{}'", ns, request.method);
    let Some(response) = shared.handlers.dispatch(&request, ns) else {
        return DispatchOutcome::Handled;
    };

    match shared.channel.with_writer(|w| w.send_response(response)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("BRIDGE: response to '{}' failed: {}", request.method, e),
        Err(e) => warn!("BRIDGE: response to '{}' failed: {}", request.method, e),
    }
    DispatchOutcome::Handled
}

/// Body of the background dispatch thread.
///
/// Holds only a weak reference between steps, so the thread winds down
/// once the last [`Bridge`] handle is gone.
pub(crate) fn run(shared: Weak<Shared>) {
    info!("BRIDGE: dispatch loop started");
    loop {
        let Some(strong) = shared.upgrade() else {
            info!("BRIDGE: bridge dropped, dispatch loop exiting");
            return;
        };
        let outcome = dispatch_once(&strong, Namespace::Normal);
        let pause = strong.channel.poll_interval();
        drop(strong);

        match outcome {
            DispatchOutcome::Handled => thread::yield_now(),
            DispatchOutcome::Idle | DispatchOutcome::Busy => thread::sleep(pause),
        }
    }
}

/// Capability to run safe-context dispatch.
///
/// Exactly one is handed out, by [`Bridge::new`]. Whoever owns it decides
/// on which execution context `Safe` handlers run; nothing else can run them.
pub struct SafeUpdater {
    bridge: Bridge,
}

impl SafeUpdater {
    pub(crate) fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    /// Serve at most one queued `Safe` request on the calling thread.
    pub fn update(&self) -> DispatchOutcome {
        dispatch_once(&self.bridge.shared, Namespace::Safe)
    }

    /// Serve `Safe` requests until none is left queued.
    /// Returns how many were handled.
    pub fn drain(&self) -> usize {
        let mut handled = 0;
        while self.update() == DispatchOutcome::Handled {
            handled += 1;
        }
        handled
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}
