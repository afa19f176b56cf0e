//! Endpoint halves: the RPC client/server plumbing over one transport.
//!
//! [`RpcReader`] owns the inbound half. Every poll drains the transport,
//! decodes complete frames and sorts them:
//!
//! ```text
//!                    ┌─▶ responses: bounded, by msgid  (claimed by waiters)
//!  TransportRx ─▶ FrameDecoder ─▶ Message
//!                    └─▶ requests: FIFO of Request     (claimed by dispatch)
//! ```
//!
//! [`RpcWriter`] owns the outbound half and allocates correlation ids.
//! Neither half does any locking; the bridge puts each behind its own lock.

use std::collections::VecDeque;

use log::{debug, warn};

use super::codec::FrameDecoder;
use super::message::{Message, MsgId, Request, Response};
use super::transport::{TransportRx, TransportTx};
use crate::error::{CallError, TransportError};

const READ_BUF_SIZE: usize = 512;

/// Responses held for waiters that have not claimed them yet; the oldest
/// is evicted beyond this.
pub const MAX_UNCLAIMED_RESPONSES: usize = 64;

/// Abandoned ids remembered so their late responses can be dropped; the
/// oldest is forgotten beyond this.
pub const MAX_ABANDONED: usize = 32;

// ── Inbound ──────────────────────────────────────────────────

pub struct RpcReader {
    rx: Box<dyn TransportRx>,
    decoder: FrameDecoder,
    responses: VecDeque<Response>,
    requests: VecDeque<Request>,
    abandoned: VecDeque<MsgId>,
    queue_depth: usize,
    dropped_requests: u32,
}

impl RpcReader {
    pub fn new(rx: Box<dyn TransportRx>, queue_depth: usize) -> Self {
        Self {
            rx,
            decoder: FrameDecoder::new(),
            responses: VecDeque::new(),
            requests: VecDeque::new(),
            abandoned: VecDeque::new(),
            queue_depth: queue_depth.max(1),
            dropped_requests: 0,
        }
    }

    /// Drain everything the transport has buffered.
    /// Returns the number of complete messages decoded.
    pub fn poll(&mut self) -> Result<usize, TransportError> {
        let mut buf = [0u8; READ_BUF_SIZE];
        let mut decoded = Vec::new();

        loop {
            let n = self.rx.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.decoder.feed(&buf[..n], |payload| match Message::from_payload(payload) {
                Ok(msg) => decoded.push(msg),
                Err(e) => warn!("RPC: dropping undecodable frame ({})", e),
            });
            if n < buf.len() {
                break;
            }
        }

        let count = decoded.len();
        for msg in decoded {
            self.accept(msg);
        }
        Ok(count)
    }

    fn accept(&mut self, msg: Message) {
        match msg {
            Message::Response {
                msgid,
                error,
                result,
            } => {
                if let Some(i) = self.abandoned.iter().position(|id| *id == msgid) {
                    self.abandoned.remove(i);
                    debug!("RPC: late response for abandoned call {}", msgid);
                    return;
                }
                if self.responses.len() >= MAX_UNCLAIMED_RESPONSES {
                    if let Some(stale) = self.responses.pop_front() {
                        warn!("RPC: evicting unclaimed response {}", stale.msgid);
                    }
                }
                self.responses.push_back(Response {
                    msgid,
                    error,
                    result,
                });
            }
            Message::Request {
                msgid,
                method,
                params,
            } => self.enqueue(Request {
                msgid: Some(msgid),
                method,
                params,
            }),
            Message::Notification { method, params } => self.enqueue(Request {
                msgid: None,
                method,
                params,
            }),
        }
    }

    fn enqueue(&mut self, request: Request) {
        if self.requests.len() >= self.queue_depth {
            self.dropped_requests = self.dropped_requests.saturating_add(1);
            warn!("RPC: request queue full, dropping '{}'", request.method);
            return;
        }
        self.requests.push_back(request);
    }

    fn take_response(&mut self, msgid: MsgId) -> Option<Response> {
        let i = self.responses.iter().position(|r| r.msgid == msgid)?;
        self.responses.remove(i)
    }

    /// Poll, then take the response for `msgid` if it has arrived.
    pub fn try_receive_response(&mut self, msgid: MsgId) -> Result<Option<Response>, TransportError> {
        if let Some(resp) = self.take_response(msgid) {
            return Ok(Some(resp));
        }
        self.poll()?;
        Ok(self.take_response(msgid))
    }

    /// Poll, then take the oldest queued request whose method `accept`s.
    ///
    /// Requests rejected by the filter stay queued, in order, for another
    /// dispatch path.
    pub fn try_receive_request(
        &mut self,
        accept: impl Fn(&str) -> bool,
    ) -> Result<Option<Request>, TransportError> {
        self.poll()?;
        let idx = self.requests.iter().position(|r| accept(&r.method));
        Ok(idx.and_then(|i| self.requests.remove(i)))
    }

    /// Forget a call nobody waits for any more; its response is dropped on arrival.
    pub fn abandon(&mut self, msgid: MsgId) {
        if self.take_response(msgid).is_some() || self.abandoned.contains(&msgid) {
            return;
        }
        if self.abandoned.len() >= MAX_ABANDONED {
            self.abandoned.pop_front();
        }
        self.abandoned.push_back(msgid);
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    /// Responses received but not yet claimed.
    pub fn unclaimed_responses(&self) -> usize {
        self.responses.len()
    }

    pub fn abandoned_calls(&self) -> usize {
        self.abandoned.len()
    }

    pub fn dropped_requests(&self) -> u32 {
        self.dropped_requests
    }
}

// ── Outbound ─────────────────────────────────────────────────

pub struct RpcWriter {
    tx: Box<dyn TransportTx>,
    next_msg_id: MsgId,
}

impl RpcWriter {
    pub fn new(tx: Box<dyn TransportTx>) -> Self {
        Self { tx, next_msg_id: 1 }
    }

    fn alloc_msg_id(&mut self) -> MsgId {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        id
    }

    fn send(&mut self, msg: &Message) -> Result<(), CallError> {
        let frame = msg.to_frame()?;
        self.tx.write_all(&frame)?;
        self.tx.flush()?;
        Ok(())
    }

    /// Send a request under a fresh correlation id and return that id.
    pub fn send_request(&mut self, method: &str, params: Vec<u8>) -> Result<MsgId, CallError> {
        let msgid = self.alloc_msg_id();
        self.send(&Message::Request {
            msgid,
            method: method.into(),
            params,
        })?;
        Ok(msgid)
    }

    pub fn send_response(&mut self, response: Response) -> Result<(), CallError> {
        self.send(&response.into_message())
    }

    pub fn send_notification(&mut self, method: &str, params: Vec<u8>) -> Result<(), CallError> {
        self.send(&Message::Notification {
            method: method.into(),
            params,
        })
    }
}
