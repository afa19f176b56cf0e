//! Correlation channel: the locking discipline over the shared link.
//!
//! The inbound and outbound halves sit behind independent locks, so a send
//! in progress never blocks a receive in progress and vice versa; only
//! work on the same direction serialises.
//!
//! ```text
//!              ┌──────────── read lock ───────────┐
//!  waiters ───▶│ RpcReader (responses, requests)  │◀─── dispatch loops
//!              └──────────────────────────────────┘
//!              ┌──────────── write lock ──────────┐
//!  callers ───▶│ RpcWriter (ids, frames out)      │◀─── dispatch loops
//!              └──────────────────────────────────┘
//! ```
//!
//! Every acquisition is bounded. A caller that times out sleeps one poll
//! interval and tries again, so a participant holding a lock for long
//! (e.g. a slow transport write) delays the others but never freezes them.

use core::time::Duration;
use std::thread;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::config::BridgeConfig;
use crate::error::TransportError;
use crate::rpc::endpoint::{RpcReader, RpcWriter};

/// Why a single bounded acquisition attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// Another participant held the lock for the whole timeout.
    Timeout,
    /// `begin` has not opened the transport yet.
    NotOpen,
}

impl From<LockError> for TransportError {
    fn from(_: LockError) -> Self {
        Self::NotOpen
    }
}

pub type ReadGuard<'a> = MappedMutexGuard<'a, RpcReader>;
pub type WriteGuard<'a> = MappedMutexGuard<'a, RpcWriter>;

pub struct CorrelationChannel {
    reader: Mutex<Option<RpcReader>>,
    writer: Mutex<Option<RpcWriter>>,
    lock_timeout: Duration,
    poll_interval: Duration,
}

impl CorrelationChannel {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            lock_timeout: config.lock_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Install the endpoint halves once the transport is open.
    pub fn attach(&self, reader: RpcReader, writer: RpcWriter) {
        *self.lock_with_retry(&self.writer) = Some(writer);
        *self.lock_with_retry(&self.reader) = Some(reader);
    }

    pub fn is_open(&self) -> bool {
        self.reader
            .try_lock_for(self.lock_timeout)
            .is_some_and(|r| r.is_some())
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// One bounded attempt at the read path.
    pub fn acquire_read(&self, timeout: Duration) -> Result<ReadGuard<'_>, LockError> {
        let guard = self.reader.try_lock_for(timeout).ok_or(LockError::Timeout)?;
        MutexGuard::try_map(guard, Option::as_mut).map_err(|_| LockError::NotOpen)
    }

    /// One bounded attempt at the write path.
    pub fn acquire_write(&self, timeout: Duration) -> Result<WriteGuard<'_>, LockError> {
        let guard = self.writer.try_lock_for(timeout).ok_or(LockError::Timeout)?;
        MutexGuard::try_map(guard, Option::as_mut).map_err(|_| LockError::NotOpen)
    }

    /// Run `f` under the write lock, retrying bounded acquisitions until
    /// the lock is obtained. Lock timeouts never surface.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut RpcWriter) -> R) -> Result<R, TransportError> {
        loop {
            match self.acquire_write(self.lock_timeout) {
                Ok(mut w) => return Ok(f(&mut w)),
                Err(LockError::NotOpen) => return Err(TransportError::NotOpen),
                Err(LockError::Timeout) => self.back_off(),
            }
        }
    }

    /// Run `f` under the read lock with the same retry policy as [`with_writer`].
    ///
    /// [`with_writer`]: Self::with_writer
    pub fn with_reader<R>(&self, f: impl FnOnce(&mut RpcReader) -> R) -> Result<R, TransportError> {
        loop {
            match self.acquire_read(self.lock_timeout) {
                Ok(mut r) => return Ok(f(&mut r)),
                Err(LockError::NotOpen) => return Err(TransportError::NotOpen),
                Err(LockError::Timeout) => self.back_off(),
            }
        }
    }

    /// Cooperative yield after a failed attempt.
    pub fn back_off(&self) {
        thread::yield_now();
        thread::sleep(self.poll_interval);
    }

    fn lock_with_retry<'a, T>(&self, lock: &'a Mutex<T>) -> MutexGuard<'a, T> {
        loop {
            if let Some(guard) = lock.try_lock_for(self.lock_timeout) {
                return guard;
            }
            self.back_off();
        }
    }
}
