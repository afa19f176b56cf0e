//! TCP server and client proxies.
//!
//! Sockets live on the co-processor; the MCU side only holds their ids.
//! Connection id `0` is never handed out by the router and marks an
//! invalid client.

use core::net::Ipv4Addr;

use heapless::Deque;
use log::{debug, warn};
use parking_lot::Mutex;

use super::ensure_ready;
use crate::bridge::Bridge;
use crate::error::CallError;
use crate::rpc::message::MAX_RESULT_BYTES;

pub mod methods {
    pub const LISTEN: &str = "tcp/listen";
    pub const ACCEPT: &str = "tcp/accept";
    pub const CONNECT: &str = "tcp/connect";
    pub const WRITE: &str = "tcp/write";
    pub const READ: &str = "tcp/read";
    pub const CLOSE: &str = "tcp/close";
}

pub const DEFAULT_TCP_BUF_SIZE: usize = 512;

// ── Server ───────────────────────────────────────────────────

struct ServerState {
    listening: bool,
    listener_id: u32,
}

pub struct TcpServer<const N: usize = DEFAULT_TCP_BUF_SIZE> {
    bridge: Bridge,
    addr: Ipv4Addr,
    port: u16,
    state: Mutex<ServerState>,
}

impl<const N: usize> TcpServer<N> {
    /// Server bound to all interfaces.
    pub fn new(bridge: Bridge, port: u16) -> Self {
        Self::with_addr(bridge, Ipv4Addr::UNSPECIFIED, port)
    }

    pub fn with_addr(bridge: Bridge, addr: Ipv4Addr, port: u16) -> Self {
        Self {
            bridge,
            addr,
            port,
            state: Mutex::new(ServerState {
                listening: false,
                listener_id: 0,
            }),
        }
    }

    /// Ask the router to start listening.
    pub fn begin(&self) -> bool {
        if !ensure_ready(&self.bridge) {
            return false;
        }
        let mut state = self.state.lock();
        let endpoint = format!("{}:{}", self.addr, self.port);
        match self.bridge.call(methods::LISTEN, (endpoint.as_str(),)).wait::<u32>() {
            Ok(id) => {
                state.listener_id = id;
                state.listening = true;
                debug!("TCP: listening on {} as #{}", endpoint, id);
            }
            Err(e) => warn!("TCP: listen on {} failed: {}", endpoint, e),
        }
        state.listening
    }

    /// Take the next pending connection. The returned client is invalid
    /// (not connected) if none was waiting.
    pub fn accept(&self) -> TcpClient<N> {
        let state = self.state.lock();
        let connection_id = self
            .bridge
            .call(methods::ACCEPT, (state.listener_id,))
            .wait::<u32>()
            .unwrap_or(0);
        drop(state);
        TcpClient::from_connection(self.bridge.clone(), connection_id)
    }

    pub fn is_listening(&self) -> bool {
        self.state.lock().listening
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

// ── Client ───────────────────────────────────────────────────

struct ClientState<const N: usize> {
    connection_id: u32,
    connected: bool,
    buffer: Deque<u8, N>,
}

pub struct TcpClient<const N: usize = DEFAULT_TCP_BUF_SIZE> {
    bridge: Bridge,
    state: Mutex<ClientState<N>>,
}

impl<const N: usize> TcpClient<N> {
    pub fn new(bridge: Bridge) -> Self {
        Self::from_connection(bridge, 0)
    }

    pub(crate) fn from_connection(bridge: Bridge, connection_id: u32) -> Self {
        Self {
            bridge,
            state: Mutex::new(ClientState {
                connection_id,
                connected: connection_id != 0,
                buffer: Deque::new(),
            }),
        }
    }

    pub fn connect(&self, host: &str, port: u16) -> bool {
        if !ensure_ready(&self.bridge) {
            return false;
        }
        let mut state = self.state.lock();
        if state.connected {
            return true;
        }
        let endpoint = format!("{host}:{port}");
        match self.bridge.call(methods::CONNECT, (endpoint.as_str(),)).wait::<u32>() {
            Ok(id) if id != 0 => {
                state.connection_id = id;
                state.connected = true;
            }
            Ok(_) => warn!("TCP: connect to {} returned no connection", endpoint),
            Err(e) => warn!("TCP: connect to {} failed: {}", endpoint, e),
        }
        state.connected
    }

    /// Send `data`; returns how many bytes the router accepted.
    pub fn write(&self, data: &[u8]) -> usize {
        let state = self.state.lock();
        if !state.connected {
            return 0;
        }
        self.bridge
            .call(methods::WRITE, (state.connection_id, data))
            .wait::<usize>()
            .unwrap_or(0)
    }

    /// Bytes readable without waiting on the router again.
    pub fn available(&self) -> usize {
        let mut state = self.state.lock();
        while self.fill(&mut state) > 0 {}
        state.buffer.len()
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        if state.buffer.is_empty() {
            self.fill(&mut state);
        }
        let mut n = 0;
        while n < buf.len() {
            let Some(b) = state.buffer.pop_front() else {
                break;
            };
            buf[n] = b;
            n += 1;
        }
        n
    }

    pub fn peek(&self) -> Option<u8> {
        let mut state = self.state.lock();
        if state.buffer.is_empty() {
            self.fill(&mut state);
        }
        state.buffer.front().copied()
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.connected {
            return;
        }
        if self
            .bridge
            .call(methods::CLOSE, (state.connection_id,))
            .wait::<String>()
            .is_ok()
        {
            state.connected = false;
            state.buffer.clear();
        }
    }

    pub fn connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn connection_id(&self) -> u32 {
        self.state.lock().connection_id
    }

    /// One `tcp/read` of at most one frame's worth. Returns bytes buffered.
    fn fill(&self, state: &mut ClientState<N>) -> usize {
        let want = (N - state.buffer.len()).min(MAX_RESULT_BYTES);
        if want == 0 || !state.connected {
            return 0;
        }
        match self
            .bridge
            .call(methods::READ, (state.connection_id, want as u32))
            .wait::<Vec<u8>>()
        {
            Ok(bytes) => {
                let n = bytes.len().min(want);
                for b in bytes.into_iter().take(n) {
                    let _ = state.buffer.push_back(b);
                }
                n
            }
            Err(CallError::Remote(e)) => {
                warn!("TCP: #{} read failed ({}), marking closed", state.connection_id, e);
                state.connected = false;
                0
            }
            Err(e) => {
                debug!("TCP: #{} read skipped: {}", state.connection_id, e);
                0
            }
        }
    }
}
