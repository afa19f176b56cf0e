//! UDP socket proxy.
//!
//! Inbound datagrams arrive as one byte stream; each packet is prefixed by
//! an 8-byte header:
//!
//! ```text
//!  0      4        6        8
//!  ┌──────┬────────┬────────┬───────────────┐
//!  │ IPv4 │ port BE│ len BE │ payload (len) │
//!  └──────┴────────┴────────┴───────────────┘
//! ```

use core::net::Ipv4Addr;

use heapless::Deque;
use log::{debug, warn};
use parking_lot::Mutex;

use super::ensure_ready;
use crate::bridge::Bridge;
use crate::error::CallError;
use crate::rpc::message::MAX_RESULT_BYTES;

pub mod methods {
    pub const CONNECT: &str = "udp/connect";
    pub const CONNECT_MULTICAST: &str = "udp/connectMulticast";
    pub const CLOSE: &str = "udp/close";
    pub const WRITE: &str = "udp/write";
    pub const READ: &str = "udp/read";
}

pub const DEFAULT_UDP_BUF_SIZE: usize = 4096;
pub const PACKET_HEADER_SIZE: usize = 8;

/// Header preceding every inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub remote_ip: Ipv4Addr,
    pub remote_port: u16,
    pub len: u16,
}

impl PacketHeader {
    pub fn parse(raw: [u8; PACKET_HEADER_SIZE]) -> Self {
        Self {
            remote_ip: Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]),
            remote_port: u16::from_be_bytes([raw[4], raw[5]]),
            len: u16::from_be_bytes([raw[6], raw[7]]),
        }
    }
}

struct UdpState<const N: usize> {
    connection_id: u32,
    connected: bool,
    port: u16,
    target_host: String,
    target_port: u16,
    remote_ip: Ipv4Addr,
    remote_port: u16,
    /// Payload bytes of the current packet not yet read.
    remaining: u16,
    buffer: Deque<u8, N>,
}

pub struct UdpSocket<const N: usize = DEFAULT_UDP_BUF_SIZE> {
    bridge: Bridge,
    state: Mutex<UdpState<N>>,
}

impl<const N: usize> UdpSocket<N> {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            bridge,
            state: Mutex::new(UdpState {
                connection_id: 0,
                connected: false,
                port: 0,
                target_host: String::new(),
                target_port: 0,
                remote_ip: Ipv4Addr::UNSPECIFIED,
                remote_port: 0,
                remaining: 0,
                buffer: Deque::new(),
            }),
        }
    }

    /// Listen on `port` on all interfaces.
    pub fn begin(&self, port: u16) -> bool {
        self.open(methods::CONNECT, Ipv4Addr::UNSPECIFIED, port)
    }

    /// Join multicast group `group` on `port`.
    pub fn begin_multicast(&self, group: Ipv4Addr, port: u16) -> bool {
        self.open(methods::CONNECT_MULTICAST, group, port)
    }

    fn open(&self, method: &str, host: Ipv4Addr, port: u16) -> bool {
        if !ensure_ready(&self.bridge) {
            return false;
        }
        let mut state = self.state.lock();
        if state.connected {
            return true;
        }
        let host = host.to_string();
        match self.bridge.call(method, (host.as_str(), port)).wait::<u32>() {
            Ok(id) => {
                state.connection_id = id;
                state.connected = true;
                state.port = port;
                debug!("UDP: #{} open on {}:{}", id, host, port);
            }
            Err(e) => warn!("UDP: open on {}:{} failed: {}", host, port, e),
        }
        state.connected
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.connected {
            return;
        }
        let closed = self
            .bridge
            .call(methods::CLOSE, (state.connection_id,))
            .wait::<String>()
            .is_ok();
        state.connected = !closed;
    }

    /// Set the destination for subsequent writes.
    pub fn begin_packet(&self, host: &str, port: u16) {
        let mut state = self.state.lock();
        state.target_host = host.to_owned();
        state.target_port = port;
    }

    pub fn end_packet(&self) {
        let mut state = self.state.lock();
        state.target_host.clear();
        state.target_port = 0;
    }

    /// Send `data` to the current packet target.
    pub fn write(&self, data: &[u8]) -> usize {
        let state = self.state.lock();
        if !state.connected {
            return 0;
        }
        self.bridge
            .call(
                methods::WRITE,
                (
                    state.connection_id,
                    state.target_host.as_str(),
                    state.target_port,
                    data,
                ),
            )
            .wait::<usize>()
            .unwrap_or(0)
    }

    /// Move to the next datagram. Returns its payload length, or 0 if no
    /// complete header is buffered yet.
    ///
    /// Unread bytes of the previous datagram are discarded first.
    pub fn parse_packet(&self) -> usize {
        let mut state = self.state.lock();

        while state.remaining > 0 {
            if state.buffer.is_empty() {
                self.fill(&mut state);
            }
            if state.buffer.pop_front().is_none() {
                return 0;
            }
            state.remaining -= 1;
        }

        if state.buffer.len() < PACKET_HEADER_SIZE {
            self.fill(&mut state);
        }
        if state.buffer.len() < PACKET_HEADER_SIZE {
            return 0;
        }

        let mut raw = [0u8; PACKET_HEADER_SIZE];
        for slot in &mut raw {
            *slot = state.buffer.pop_front().unwrap_or_default();
        }
        let header = PacketHeader::parse(raw);
        state.remote_ip = header.remote_ip;
        state.remote_port = header.remote_port;
        state.remaining = header.len;
        usize::from(header.len)
    }

    /// Bytes buffered locally, after topping up from the router.
    pub fn available(&self) -> usize {
        let mut state = self.state.lock();
        while self.fill(&mut state) > 0 {}
        state.buffer.len()
    }

    /// Read payload of the current datagram; stops at its end.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let mut n = 0;
        while state.remaining > 0 && n < buf.len() {
            if state.buffer.is_empty() {
                self.fill(&mut state);
            }
            let Some(b) = state.buffer.pop_front() else {
                break;
            };
            buf[n] = b;
            n += 1;
            state.remaining -= 1;
        }
        n
    }

    pub fn peek(&self) -> Option<u8> {
        let state = self.state.lock();
        if state.remaining == 0 {
            return None;
        }
        state.buffer.front().copied()
    }

    pub fn remote_ip(&self) -> Ipv4Addr {
        self.state.lock().remote_ip
    }

    pub fn remote_port(&self) -> u16 {
        self.state.lock().remote_port
    }

    pub fn local_port(&self) -> u16 {
        self.state.lock().port
    }

    pub fn connected(&self) -> bool {
        self.state.lock().connected
    }

    /// One `udp/read` of at most one frame's worth. Returns bytes buffered.
    fn fill(&self, state: &mut UdpState<N>) -> usize {
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
                warn!("UDP: #{} read failed ({}), marking closed", state.connection_id, e);
                state.connected = false;
                0
            }
            Err(e) => {
                debug!("UDP: #{} read skipped: {}", state.connection_id, e);
                0
            }
        }
    }
}
