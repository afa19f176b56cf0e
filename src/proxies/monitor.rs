//! Router monitor console.
//!
//! A text channel to the router's monitor service. Whole-string reads and
//! writes go straight through; byte-wise reads are served from a local
//! buffer topped up on demand.

use heapless::Deque;
use log::debug;
use parking_lot::Mutex;

use super::ensure_ready;
use crate::bridge::Bridge;
use crate::rpc::message::MAX_RESULT_BYTES;

pub mod methods {
    pub const CONNECTED: &str = "mon/connected";
    pub const RESET: &str = "mon/reset";
    pub const READ: &str = "mon/read";
    pub const WRITE: &str = "mon/write";
}

pub const DEFAULT_MONITOR_BUF_SIZE: usize = 512;

struct MonitorState<const N: usize> {
    connected: bool,
    buffer: Deque<u8, N>,
}

pub struct Monitor<const N: usize = DEFAULT_MONITOR_BUF_SIZE> {
    bridge: Bridge,
    state: Mutex<MonitorState<N>>,
}

impl<const N: usize> Monitor<N> {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            bridge,
            state: Mutex::new(MonitorState {
                connected: false,
                buffer: Deque::new(),
            }),
        }
    }

    /// Ask the router whether a monitor client is attached.
    pub fn begin(&self) -> bool {
        if !ensure_ready(&self.bridge) {
            return false;
        }
        let mut state = self.state.lock();
        match self.bridge.call(methods::CONNECTED, ()).wait::<bool>() {
            Ok(connected) => {
                state.connected = connected;
                true
            }
            Err(e) => {
                debug!("MON: connected query failed: {}", e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn reset(&self) -> bool {
        let mut state = self.state.lock();
        let ok = self
            .bridge
            .call(methods::RESET, ())
            .wait::<bool>()
            .unwrap_or(false);
        if ok {
            state.connected = false;
            state.buffer.clear();
        }
        ok
    }

    /// Send `message`; returns the number of bytes the router took.
    pub fn write(&self, message: &str) -> usize {
        let _state = self.state.lock();
        self.bridge
            .call(methods::WRITE, (message,))
            .wait::<usize>()
            .unwrap_or(0)
    }

    /// Read up to `size` bytes of text straight from the router, at most
    /// one frame's worth per call.
    pub fn read(&self, size: usize) -> Option<String> {
        let _state = self.state.lock();
        let size = size.min(MAX_RESULT_BYTES);
        self.bridge.call(methods::READ, (size,)).wait::<String>().ok()
    }

    pub fn available(&self) -> usize {
        let mut state = self.state.lock();
        self.fill(&mut state);
        state.buffer.len()
    }

    pub fn read_bytes(&self, buf: &mut [u8]) -> usize {
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

    fn fill(&self, state: &mut MonitorState<N>) {
        let free = (N - state.buffer.len()).min(MAX_RESULT_BYTES);
        if free == 0 {
            return;
        }
        if let Ok(text) = self.bridge.call(methods::READ, (free,)).wait::<String>() {
            for b in text.into_bytes().into_iter().take(free) {
                let _ = state.buffer.push_back(b);
            }
        }
    }
}
