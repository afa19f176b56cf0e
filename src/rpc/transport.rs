//! Transport abstraction: any byte-oriented duplex channel.
//!
//! Concrete implementations:
//! - UART to the co-processor (`adapters::uart`, ESP-IDF only)
//! - In-memory pipe (host simulation and tests)
//! - Null transport (no peer attached)
//!
//! A transport is opened exactly once and split into independent read and
//! write halves, so the bridge can guard each direction with its own lock.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TransportError;

/// Unopened byte-oriented transport.
pub trait Transport: Send {
    /// Open the link at `baud_rate` and split it into read/write halves.
    fn open(
        self: Box<Self>,
        baud_rate: u32,
    ) -> Result<(Box<dyn TransportRx>, Box<dyn TransportTx>), TransportError>;
}

/// Inbound half.
pub trait TransportRx: Send {
    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Outbound half.
pub trait TransportTx: Send {
    /// Write `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Write the whole buffer or fail.
    fn write_all(&mut self, mut data: &[u8]) -> Result<(), TransportError> {
        while !data.is_empty() {
            match self.write(data)? {
                0 => return Err(TransportError::WriteFailed),
                n => data = &data[n..],
            }
        }
        Ok(())
    }
}

// ── Null transport ───────────────────────────────────────────

/// A transport that discards all writes and never reads.
/// Useful as a placeholder when no co-processor is attached.
pub struct NullTransport;

impl Transport for NullTransport {
    fn open(
        self: Box<Self>,
        _baud_rate: u32,
    ) -> Result<(Box<dyn TransportRx>, Box<dyn TransportTx>), TransportError> {
        Ok((Box::new(NullHalf), Box::new(NullHalf)))
    }
}

struct NullHalf;

impl TransportRx for NullHalf {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(0)
    }
}

impl TransportTx for NullHalf {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

// ── In-memory pipe ───────────────────────────────────────────

type Lane = Arc<Mutex<VecDeque<u8>>>;

/// One end of an in-memory duplex link created by [`pipe`].
pub struct MemTransport {
    rx: Lane,
    tx: Lane,
}

/// Create a connected pair of in-memory transports.
///
/// Bytes written on one end are read on the other, in order.
pub fn pipe() -> (MemTransport, MemTransport) {
    let a_to_b: Lane = Arc::default();
    let b_to_a: Lane = Arc::default();
    (
        MemTransport {
            rx: b_to_a.clone(),
            tx: a_to_b.clone(),
        },
        MemTransport {
            rx: a_to_b,
            tx: b_to_a,
        },
    )
}

impl MemTransport {
    /// Split without going through [`Transport::open`].
    pub fn into_halves(self) -> (MemRx, MemTx) {
        (MemRx { lane: self.rx }, MemTx { lane: self.tx })
    }
}

impl Transport for MemTransport {
    fn open(
        self: Box<Self>,
        _baud_rate: u32,
    ) -> Result<(Box<dyn TransportRx>, Box<dyn TransportTx>), TransportError> {
        let (rx, tx) = self.into_halves();
        Ok((Box::new(rx), Box::new(tx)))
    }
}

pub struct MemRx {
    lane: Lane,
}

impl TransportRx for MemRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut lane = self.lane.lock();
        let n = buf.len().min(lane.len());
        for (dst, src) in buf.iter_mut().zip(lane.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

pub struct MemTx {
    lane: Lane,
}

impl TransportTx for MemTx {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.lane.lock().extend(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
