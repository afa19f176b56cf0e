//! Transport-agnostic RPC layer the bridge runs on.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      RPC Stack                             │
//! │                                                            │
//! │  ┌───────────┐   ┌──────────┐   ┌───────────────────────┐  │
//! │  │ Transport │──▶│  Codec   │──▶│ RpcReader             │  │
//! │  │ Rx half   │   │ (framing)│   │ responses / requests  │  │
//! │  └───────────┘   └──────────┘   └───────────┬───────────┘  │
//! │                                             ▼              │
//! │                                 ┌───────────────────────┐  │
//! │                                 │ HandlerTable          │  │
//! │                                 │ (Normal | Safe)       │  │
//! │                                 └───────────┬───────────┘  │
//! │  ┌───────────┐   ┌──────────┐               │              │
//! │  │ Transport │◀──│ RpcWriter│◀──────────────┘              │
//! │  │ Tx half   │   │ (ids)    │                              │
//! │  └───────────┘   └──────────┘                              │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod endpoint;
pub mod message;
pub mod server;
pub mod transport;

/// Reserved method names understood by the co-processor.
pub mod methods {
    /// Reset the remote side's bridge state; answers `true` when done.
    pub const RESET: &str = "$/reset";
    /// Announce a locally provided method name to the remote router.
    pub const REGISTER: &str = "$/register";
    /// Sent by the remote side once it is ready to accept calls.
    pub const READY: &str = "$/ready";
}
