//! Unified error types for the bridge.
//!
//! Each layer owns a small error enum (transport, codec, remote RPC error
//! record, pending call, lifecycle) and every one of them converts into the
//! crate-level [`Error`], keeping the embedding application's handling
//! uniform. Lock-acquisition timeouts never appear in the
//! public taxonomy: they are retried where they happen.

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible bridge operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The physical link failed.
    Transport(TransportError),
    /// A frame or payload could not be encoded/decoded.
    Codec(CodecError),
    /// A remote call did not produce a usable result.
    Call(CallError),
    /// Startup or handler registration failed.
    Bridge(BridgeError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Call(e) => write!(f, "call: {e}"),
            Self::Bridge(e) => write!(f, "bridge: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}
impl std::error::Error for TransportError {}
impl std::error::Error for CodecError {}
impl std::error::Error for RpcError {}
impl std::error::Error for CallError {}
impl std::error::Error for BridgeError {}
impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The link could not be opened at the requested settings.
    OpenFailed,
    /// The peer end is gone.
    Disconnected,
    /// A read returned an error.
    ReadFailed,
    /// A write returned an error or wrote nothing.
    WriteFailed,
    /// Operation attempted before `begin` opened the link.
    NotOpen,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "open failed"),
            Self::Disconnected => write!(f, "peer disconnected"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::NotOpen => write!(f, "transport not open"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Payload exceeds the maximum frame size.
    FrameTooLarge(usize),
    /// Serialisation of a message or argument tuple failed.
    Encode,
    /// Bytes did not decode into the expected shape.
    Decode,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameTooLarge(len) => write!(f, "frame too large ({len} bytes)"),
            Self::Encode => write!(f, "encode failed"),
            Self::Decode => write!(f, "decode failed"),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<postcard::Error> for CodecError {
    fn from(e: postcard::Error) -> Self {
        match e {
            postcard::Error::SerializeBufferFull
            | postcard::Error::SerializeSeqLengthUnknown
            | postcard::Error::SerdeSerCustom => Self::Encode,
            _ => Self::Decode,
        }
    }
}

// ---------------------------------------------------------------------------
// Remote error record
// ---------------------------------------------------------------------------

/// Error record carried by every response, `{code, message}`.
///
/// `code == NO_ERR` is the success record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: u8,
    pub message: String,
}

impl RpcError {
    pub const NO_ERR: u8 = 0x00;
    pub const PARSING_ERR: u8 = 0xFC;
    pub const MALFORMED_CALL_ERR: u8 = 0xFD;
    pub const FUNCTION_NOT_FOUND_ERR: u8 = 0xFE;
    pub const GENERIC_ERR: u8 = 0xFF;

    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The success record.
    pub fn none() -> Self {
        Self::new(Self::NO_ERR, "")
    }

    /// Record used before a call has run.
    pub fn not_executed() -> Self {
        Self::new(Self::GENERIC_ERR, "call not yet executed")
    }

    pub fn is_ok(&self) -> bool {
        self.code == Self::NO_ERR
    }
}

impl Default for RpcError {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error 0x{:02X}: {}", self.code, self.message)
    }
}

// ---------------------------------------------------------------------------
// Call errors
// ---------------------------------------------------------------------------

/// Why a [`PendingCall`](crate::bridge::PendingCall) did not yield a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The bridge has not completed its handshake.
    NotReady,
    /// No matching response arrived within the configured call timeout.
    Timeout,
    /// The far side answered with a non-`NO_ERR` record.
    Remote(RpcError),
    /// Arguments or result could not be (de)serialised.
    Codec(CodecError),
    /// The link failed while sending or receiving.
    Transport(TransportError),
}

impl CallError {
    /// The error record this failure maps onto.
    pub fn to_record(&self) -> RpcError {
        match self {
            Self::NotReady => RpcError::new(RpcError::GENERIC_ERR, "bridge not ready"),
            Self::Timeout => RpcError::new(RpcError::GENERIC_ERR, "response timeout"),
            Self::Remote(e) => e.clone(),
            Self::Codec(e) => RpcError::new(RpcError::PARSING_ERR, format!("{e}")),
            Self::Transport(e) => RpcError::new(RpcError::GENERIC_ERR, format!("{e}")),
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "bridge not ready"),
            Self::Timeout => write!(f, "response timeout"),
            Self::Remote(e) => write!(f, "{e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

impl From<CodecError> for CallError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<TransportError> for CallError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<RpcError> for CallError {
    fn from(e: RpcError) -> Self {
        Self::Remote(e)
    }
}

impl From<CallError> for Error {
    fn from(e: CallError) -> Self {
        Self::Call(e)
    }
}

// ---------------------------------------------------------------------------
// Bridge lifecycle errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The transport could not be opened.
    Transport(TransportError),
    /// The dispatch thread could not be spawned.
    SpawnFailed,
    /// The reset call failed or answered `false`; the bridge stays not ready.
    HandshakeFailed(CallError),
    /// The remote refused (or never answered) the registration call.
    RegistrationFailed(CallError),
    /// A handler with this name already exists in the target namespace.
    AlreadyBound,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::SpawnFailed => write!(f, "dispatch thread spawn failed"),
            Self::HandshakeFailed(e) => write!(f, "handshake failed: {e}"),
            Self::RegistrationFailed(e) => write!(f, "registration failed: {e}"),
            Self::AlreadyBound => write!(f, "handler already bound"),
        }
    }
}

impl From<TransportError> for BridgeError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<BridgeError> for Error {
    fn from(e: BridgeError) -> Self {
        Self::Bridge(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The document could not be parsed.
    Parse,
    /// A field is outside its allowed range.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "parse failed"),
            Self::ValidationFailed(field) => write!(f, "invalid {field}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
