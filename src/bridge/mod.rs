//! The bridge: call co-processor services as if they were local.
//!
//! ```text
//!   application thread            dispatch thread          app loop
//!   ──────────────────            ───────────────          ────────
//!   bridge.call(..) ─┐            Normal handlers          SafeUpdater
//!   PendingCall      │                  │                  Safe handlers
//!                    ▼                  ▼                       │
//!          ┌──────────────────────────────────────────────────┐ │
//!          │ CorrelationChannel  (write lock | read lock)     │◀┘
//!          └──────────────────────────────────────────────────┘
//!                                │ UART
//!                          co-processor router
//! ```
//!
//! A [`Bridge`] is a cheap handle; clone it into every proxy that needs
//! the link. Lifecycle:
//!
//! ```text
//!   Uninitialized ──begin──▶ AwaitingHandshake ──reset ok──▶ Ready
//!                                    │
//!                                    └──reset failed──▶ Failed ──begin──▶ …
//! ```

pub mod channel;
pub mod dispatch;
pub mod pending;

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, CallError, RpcError};
use crate::rpc::endpoint::{RpcReader, RpcWriter};
use crate::rpc::message::encode_value;
use crate::rpc::methods;
use crate::rpc::server::{HandlerTable, Namespace, handler};
use crate::rpc::transport::Transport;
use crate::task::{Core, spawn_on_core};

use channel::CorrelationChannel;
pub use dispatch::{DispatchOutcome, SafeUpdater};
use pending::CallMode;
pub use pending::PendingCall;

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    Uninitialized = 0,
    AwaitingHandshake = 1,
    Ready = 2,
    Failed = 3,
}

impl BridgeState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::AwaitingHandshake,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Uninitialized,
        }
    }
}

/// Latched "the co-processor said it is ready" flag.
#[derive(Default)]
struct ReadySignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl ReadySignal {
    fn raise(&self) {
        *self.raised.lock() = true;
        self.cond.notify_all();
    }

    /// Wait up to `timeout` for the signal. Returns whether it was raised.
    fn wait(&self, timeout: Duration) -> bool {
        let mut raised = self.raised.lock();
        if !*raised {
            let _ = self.cond.wait_while_for(&mut raised, |r| !*r, timeout);
        }
        *raised
    }
}

/// Lifecycle-owned resources, guarded by the lifecycle lock.
struct Lifecycle {
    transport: Option<Box<dyn Transport>>,
    dispatch: Option<JoinHandle<()>>,
}

pub(crate) struct Shared {
    config: BridgeConfig,
    channel: CorrelationChannel,
    handlers: HandlerTable,
    started: AtomicBool,
    state: AtomicU8,
    lifecycle: Mutex<Lifecycle>,
    ready: Arc<ReadySignal>,
}

/// Handle to one bridge instance.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

impl Bridge {
    /// Create a bridge over `transport`.
    ///
    /// Returns the shareable handle and the single [`SafeUpdater`]
    /// capability; hand the latter to the application loop only.
    pub fn new(transport: impl Transport + 'static, config: BridgeConfig) -> (Self, SafeUpdater) {
        let shared = Shared {
            channel: CorrelationChannel::new(&config),
            handlers: HandlerTable::new(),
            started: AtomicBool::new(false),
            state: AtomicU8::new(BridgeState::Uninitialized as u8),
            lifecycle: Mutex::new(Lifecycle {
                transport: Some(Box::new(transport)),
                dispatch: None,
            }),
            ready: Arc::default(),
            config,
        };
        let bridge = Self {
            shared: Arc::new(shared),
        };
        let updater = SafeUpdater::new(bridge.clone());
        (bridge, updater)
    }

    /// `true` once the startup handshake has succeeded.
    pub fn is_ready(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    fn set_state(&self, state: BridgeState) {
        self.shared.state.store(state as u8, Ordering::Release);
    }

    /// Open the link, start the dispatch thread and run the handshake.
    ///
    /// Idempotent: returns `Ok` straight away on a ready bridge. After a
    /// failed handshake it may be called again; the transport is opened and
    /// the dispatch thread spawned only the first time.
    pub fn begin(&self) -> Result<(), BridgeError> {
        if self.is_ready() {
            return Ok(());
        }

        let mut life = self.shared.lifecycle.lock();
        if self.is_ready() {
            return Ok(());
        }
        self.set_state(BridgeState::AwaitingHandshake);

        if let Some(transport) = life.transport.take() {
            let (rx, tx) = transport
                .open(self.shared.config.baud_rate)
                .inspect_err(|_| self.set_state(BridgeState::Failed))?;
            let depth = usize::from(self.shared.config.request_queue_depth);
            self.shared
                .channel
                .attach(RpcReader::new(rx, depth), RpcWriter::new(tx));
            info!(
                "BRIDGE: transport open at {} baud",
                self.shared.config.baud_rate
            );
        }

        if !self.shared.handlers.is_bound(methods::READY, Namespace::Normal) {
            let signal = Arc::clone(&self.shared.ready);
            self.shared.handlers.bind(
                methods::READY,
                handler(move |(): ()| {
                    signal.raise();
                    true
                }),
                Namespace::Normal,
            );
        }

        if life.dispatch.is_none() {
            let weak = Arc::downgrade(&self.shared);
            let cfg = &self.shared.config;
            let handle = spawn_on_core(
                Core::from_index(cfg.dispatch_core),
                cfg.dispatch_priority,
                usize::from(cfg.dispatch_stack_kb),
                "bridge-dispatch\0",
                move || dispatch::run(weak),
            )
            .map_err(|e| {
                warn!("BRIDGE: dispatch thread spawn failed: {}", e);
                self.set_state(BridgeState::Failed);
                BridgeError::SpawnFailed
            })?;
            life.dispatch = Some(handle);
        }

        let timeout = self.shared.config.handshake_timeout();
        if !self.shared.ready.wait(timeout) {
            warn!(
                "BRIDGE: no readiness signal within {}ms, resetting anyway",
                timeout.as_millis()
            );
        }

        // The reset waits without a deadline: a bridge that cannot finish
        // its handshake is unusable.
        let reset = PendingCall::new(
            self.clone(),
            methods::RESET,
            encode_value(&()),
            CallMode::Lifecycle(None),
        );
        let outcome = match reset.wait::<bool>() {
            Ok(true) => Ok(()),
            Ok(false) => Err(CallError::Remote(RpcError::new(
                RpcError::GENERIC_ERR,
                "reset refused",
            ))),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.shared.started.store(true, Ordering::Release);
                self.set_state(BridgeState::Ready);
                info!("BRIDGE: ready");
                Ok(())
            }
            Err(e) => {
                warn!("BRIDGE: handshake failed: {}", e);
                self.set_state(BridgeState::Failed);
                Err(BridgeError::HandshakeFailed(e))
            }
        }
    }

    /// Build a call to `method` with argument tuple `args`. No I/O happens
    /// until the result is requested or the call is dropped.
    pub fn call<A: Serialize>(&self, method: &str, args: A) -> PendingCall {
        PendingCall::new(
            self.clone(),
            method,
            encode_value(&args),
            CallMode::Application(self.shared.config.call_timeout()),
        )
    }

    /// Send a notification; the far side never answers it.
    pub fn notify<A: Serialize>(&self, method: &str, args: A) -> Result<(), CallError> {
        if !self.is_ready() {
            return Err(CallError::NotReady);
        }
        let params = encode_value(&args)?;
        self.shared
            .channel
            .with_writer(|w| w.send_notification(method, params))?
    }

    /// Register `f` with the co-processor and bind it for the dispatch thread.
    pub fn provide<A, R, F>(&self, name: &str, f: F) -> Result<(), BridgeError>
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.provide_in(name, handler(f), Namespace::Normal)
    }

    /// Like [`provide`](Self::provide), but `f` only runs from the
    /// application loop's [`SafeUpdater`].
    pub fn provide_safe<A, R, F>(&self, name: &str, f: F) -> Result<(), BridgeError>
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.provide_in(name, handler(f), Namespace::Safe)
    }

    fn provide_in(
        &self,
        name: &str,
        handler: crate::rpc::server::Handler,
        ns: Namespace,
    ) -> Result<(), BridgeError> {
        let _life = self.shared.lifecycle.lock();
        if self.shared.handlers.is_bound(name, ns) {
            return Err(BridgeError::AlreadyBound);
        }

        let register = PendingCall::new(
            self.clone(),
            methods::REGISTER,
            encode_value(&(name,)),
            CallMode::Lifecycle(self.shared.config.call_timeout()),
        );
        match register.wait::<bool>() {
            Ok(true) => {}
            Ok(false) => {
                return Err(BridgeError::RegistrationFailed(CallError::Remote(
                    RpcError::new(RpcError::GENERIC_ERR, "registration refused"),
                )));
            }
            Err(e) => {
                warn!("BRIDGE: registering '{}' failed: {}", name, e);
                return Err(BridgeError::RegistrationFailed(e));
            }
        }

        if !self.shared.handlers.bind(name, handler, ns) {
            return Err(BridgeError::AlreadyBound);
        }
        info!("BRIDGE: provided '{}' ({:?})", name, ns);
        Ok(())
    }

    /// Whether `name` is bound locally in `ns`.
    pub fn is_provided(&self, name: &str, ns: Namespace) -> bool {
        self.shared.handlers.is_bound(name, ns)
    }
}
