//! RPC message model.
//!
//! Three message kinds share the link, distinguished by the enum tag:
//!
//! ```text
//! Request      { msgid, method, params }   caller → callee, expects a Response
//! Response     { msgid, error,  result }   answers the Request with that msgid
//! Notification {        method, params }   fire-and-forget, never answered
//! ```
//!
//! `params` and `result` are themselves postcard-encoded values (an
//! argument tuple and a return value), kept as opaque bytes so the
//! framing layer never needs to know the handler signatures.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::codec::{MAX_FRAME_SIZE, encode_frame};
use crate::error::{CodecError, RpcError};

/// Correlation id assigned to every request.
pub type MsgId = u32;

/// Worst-case bytes a success response adds around a byte-string result:
/// tag, msgid varint, empty error record and two length varints.
pub const RESPONSE_OVERHEAD: usize = 32;

/// Largest byte or text result that still fits in one response frame.
/// Proxies never ask the router for more than this per read.
pub const MAX_RESULT_BYTES: usize = MAX_FRAME_SIZE - RESPONSE_OVERHEAD;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Request {
        msgid: MsgId,
        method: String,
        params: Vec<u8>,
    },
    Response {
        msgid: MsgId,
        error: RpcError,
        result: Vec<u8>,
    },
    Notification {
        method: String,
        params: Vec<u8>,
    },
}

impl Message {
    /// Serialise into a length-prefixed frame ready for the transport.
    pub fn to_frame(&self) -> Result<Vec<u8>, CodecError> {
        let payload = postcard::to_allocvec(self)?;
        encode_frame(&payload)
    }

    /// Decode a frame payload (header already stripped).
    pub fn from_payload(payload: &[u8]) -> Result<Self, CodecError> {
        Ok(postcard::from_bytes(payload)?)
    }
}

/// An inbound call from the far side, awaiting dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// `None` for notifications, which get no response.
    pub msgid: Option<MsgId>,
    pub method: String,
    pub params: Vec<u8>,
}

impl Request {
    /// Decode the argument tuple.
    pub fn args<A: DeserializeOwned>(&self) -> Result<A, CodecError> {
        decode_value(&self.params)
    }
}

/// An inbound answer to one of our own requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub msgid: MsgId,
    pub error: RpcError,
    pub result: Vec<u8>,
}

impl Response {
    pub fn ok(msgid: MsgId, result: Vec<u8>) -> Self {
        Self {
            msgid,
            error: RpcError::none(),
            result,
        }
    }

    pub fn err(msgid: MsgId, error: RpcError) -> Self {
        Self {
            msgid,
            error,
            result: Vec::new(),
        }
    }

    pub fn into_message(self) -> Message {
        Message::Response {
            msgid: self.msgid,
            error: self.error,
            result: self.result,
        }
    }
}

/// Encode an argument tuple or return value.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(postcard::to_allocvec(value)?)
}

/// Decode an argument tuple or return value.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(postcard::from_bytes(bytes)?)
}
