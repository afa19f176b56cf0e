//! Simulated co-processor router for integration tests.
//!
//! Runs its own thread on the far end of an in-memory pipe, answers the
//! bridge's lifecycle calls, serves whatever handlers a test installs and
//! records every method it was asked for. Tests can also call into the MCU
//! through it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use routerbridge::rpc::endpoint::{RpcReader, RpcWriter};
use routerbridge::rpc::message::{decode_value, encode_value};
use routerbridge::rpc::methods;
use routerbridge::rpc::server::{HandlerTable, Namespace, handler};
use routerbridge::rpc::transport::{MemTransport, pipe};
use routerbridge::{Bridge, BridgeConfig, RpcError, SafeUpdater};
use serde::Serialize;
use serde::de::DeserializeOwned;

const ROUTER_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Short timings so failure paths finish quickly.
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        lock_timeout_ms: 5,
        poll_interval_ms: 1,
        handshake_timeout_ms: 50,
        call_timeout_ms: Some(2_000),
        ..BridgeConfig::default()
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

struct RouterInner {
    reader: Mutex<RpcReader>,
    writer: Mutex<RpcWriter>,
    handlers: HandlerTable,
    counts: Mutex<HashMap<String, usize>>,
    silenced: Mutex<HashSet<String>>,
    registered: Arc<Mutex<Vec<String>>>,
    accept_registration: Arc<AtomicBool>,
    accept_reset: Arc<AtomicBool>,
}

impl RouterInner {
    fn serve_one(&self) -> bool {
        let request = match self.reader.lock().try_receive_request(|_| true) {
            Ok(Some(r)) => r,
            _ => return false,
        };
        *self.counts.lock().entry(request.method.clone()).or_default() += 1;
        if self.silenced.lock().contains(&request.method) {
            return true;
        }
        if let Some(resp) = self.handlers.dispatch(&request, Namespace::Normal) {
            let _ = self.writer.lock().send_response(resp);
        }
        true
    }
}

pub struct MockRouter {
    inner: Arc<RouterInner>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

#[allow(dead_code)]
impl MockRouter {
    /// Start a router; returns it with the MCU end of the link.
    pub fn start() -> (MemTransport, Self) {
        let (mcu, router) = pipe();
        let (rx, tx) = router.into_halves();

        let registered = Arc::new(Mutex::new(Vec::new()));
        let accept_registration = Arc::new(AtomicBool::new(true));
        let accept_reset = Arc::new(AtomicBool::new(true));

        let handlers = HandlerTable::new();
        let reset_flag = Arc::clone(&accept_reset);
        handlers.bind(
            methods::RESET,
            handler(move |(): ()| reset_flag.load(Ordering::SeqCst)),
            Namespace::Normal,
        );
        let reg_flag = Arc::clone(&accept_registration);
        let reg_list = Arc::clone(&registered);
        handlers.bind(
            methods::REGISTER,
            handler(move |(name,): (String,)| {
                if !reg_flag.load(Ordering::SeqCst) {
                    return false;
                }
                reg_list.lock().push(name);
                true
            }),
            Namespace::Normal,
        );
        handlers.bind("echo", handler(|(x,): (i32,)| x), Namespace::Normal);
        handlers.bind("ping", handler(|(): ()| true), Namespace::Normal);

        let inner = Arc::new(RouterInner {
            reader: Mutex::new(RpcReader::new(Box::new(rx), 64)),
            writer: Mutex::new(RpcWriter::new(Box::new(tx))),
            handlers,
            counts: Mutex::default(),
            silenced: Mutex::default(),
            registered,
            accept_registration,
            accept_reset,
        });

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let inner = Arc::clone(&inner);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    if !inner.serve_one() {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        };

        (
            mcu,
            Self {
                inner,
                stop,
                thread: Some(thread),
            },
        )
    }

    /// Install a router-side service.
    pub fn on<A, R, F>(&self, name: &str, f: F)
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        assert!(
            self.inner.handlers.bind(name, handler(f), Namespace::Normal),
            "router handler '{name}' bound twice"
        );
    }

    /// Receive `name` but never answer it.
    pub fn silence(&self, name: &str) {
        self.inner.silenced.lock().insert(name.to_owned());
    }

    pub fn set_accept_registration(&self, accept: bool) {
        self.inner.accept_registration.store(accept, Ordering::SeqCst);
    }

    pub fn set_accept_reset(&self, accept: bool) {
        self.inner.accept_reset.store(accept, Ordering::SeqCst);
    }

    /// How many times `method` arrived from the MCU.
    pub fn count(&self, method: &str) -> usize {
        self.inner.counts.lock().get(method).copied().unwrap_or(0)
    }

    pub fn registered(&self) -> Vec<String> {
        self.inner.registered.lock().clone()
    }

    /// Call a service the MCU provides.
    pub fn call<A: Serialize, T: DeserializeOwned>(&self, method: &str, args: A) -> Result<T, RpcError> {
        let params = encode_value(&args).expect("encode args");
        let msgid = self
            .inner
            .writer
            .lock()
            .send_request(method, params)
            .expect("router send");

        let deadline = Instant::now() + ROUTER_CALL_TIMEOUT;
        loop {
            let resp = self
                .inner
                .reader
                .lock()
                .try_receive_response(msgid)
                .expect("router read");
            if let Some(resp) = resp {
                if !resp.error.is_ok() {
                    return Err(resp.error);
                }
                return Ok(decode_value(&resp.result).expect("decode result"));
            }
            if Instant::now() >= deadline {
                return Err(RpcError::new(RpcError::GENERIC_ERR, "router call timed out"));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Send a notification to the MCU.
    pub fn notify<A: Serialize>(&self, method: &str, args: A) {
        let params = encode_value(&args).expect("encode args");
        self.inner
            .writer
            .lock()
            .send_notification(method, params)
            .expect("router send");
    }
}

impl Drop for MockRouter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

/// A bridge wired to a fresh router, not yet started.
pub fn bridge_with_router(config: BridgeConfig) -> (Bridge, SafeUpdater, MockRouter) {
    let (link, router) = MockRouter::start();
    let (bridge, safe) = Bridge::new(link, config);
    (bridge, safe, router)
}

/// A bridge wired to a fresh router, handshake done.
pub fn started_bridge() -> (Bridge, SafeUpdater, MockRouter) {
    let (bridge, safe, router) = bridge_with_router(test_config());
    bridge.begin().expect("handshake");
    (bridge, safe, router)
}
