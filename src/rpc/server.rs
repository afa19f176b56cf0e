//! Handler table: named handlers in two dispatch namespaces.
//!
//! `Normal` handlers run on the background dispatch thread. `Safe`
//! handlers run only when the application's own loop asks for them, for
//! operations whose drivers must stay on the application context.
//!
//! A method bound in the `Safe` namespace is routed to safe dispatch even
//! if the same name also exists in `Normal`.
//!
//! The table is read concurrently by both dispatch paths and written only
//! while the bridge holds its lifecycle lock. Lookups clone the handler
//! `Arc` and release the table before the handler runs, so a handler may
//! itself register further handlers.
//!
//! A panicking handler is answered with `GENERIC_ERR`; the dispatch path
//! that ran it keeps serving.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};

use super::message::{Request, Response, decode_value, encode_value};
use crate::error::RpcError;

/// Dispatch namespace a handler is bound into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Normal,
    Safe,
}

/// Type-erased handler: encoded argument tuple in, encoded result out.
pub type Handler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, RpcError> + Send + Sync>;

/// Wrap a typed closure as a [`Handler`].
///
/// `A` is the argument tuple (`()` for none, `(T,)` for one).
pub fn handler<A, R, F>(f: F) -> Handler
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A) -> R + Send + Sync + 'static,
{
    Arc::new(move |params: &[u8]| -> Result<Vec<u8>, RpcError> {
        let args: A = decode_value(params)
            .map_err(|_| RpcError::new(RpcError::MALFORMED_CALL_ERR, "malformed arguments"))?;
        encode_value(&f(args))
            .map_err(|_| RpcError::new(RpcError::PARSING_ERR, "result encoding failed"))
    })
}

#[derive(Default)]
pub struct HandlerTable {
    normal: RwLock<HashMap<String, Handler>>,
    safe: RwLock<HashMap<String, Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn space(&self, ns: Namespace) -> &RwLock<HashMap<String, Handler>> {
        match ns {
            Namespace::Normal => &self.normal,
            Namespace::Safe => &self.safe,
        }
    }

    /// Bind `name` in `ns`. Returns `false` if the name is already taken there.
    pub fn bind(&self, name: &str, handler: Handler, ns: Namespace) -> bool {
        let mut space = self.space(ns).write();
        if space.contains_key(name) {
            return false;
        }
        space.insert(name.to_owned(), handler);
        true
    }

    pub fn is_bound(&self, name: &str, ns: Namespace) -> bool {
        self.space(ns).read().contains_key(name)
    }

    /// Which dispatch path an inbound request for `method` belongs to.
    pub fn route(&self, method: &str) -> Namespace {
        if self.is_bound(method, Namespace::Safe) {
            Namespace::Safe
        } else {
            Namespace::Normal
        }
    }

    /// Run the handler for `request` from namespace `ns`.
    ///
    /// Returns the response to send, or `None` for notifications.
    pub fn dispatch(&self, request: &Request, ns: Namespace) -> Option<Response> {
        let handler = self.space(ns).read().get(&request.method).cloned();

        let outcome = match handler {
            Some(h) => panic::catch_unwind(AssertUnwindSafe(|| h(&request.params)))
                .unwrap_or_else(|_| {
                    warn!("RPC: handler '{}' panicked", request.method);
                    Err(RpcError::new(
                        RpcError::GENERIC_ERR,
                        format!("handler panicked: {}", request.method),
                    ))
                }),
            None => {
                warn!("RPC: no {:?} handler for '{}'", ns, request.method);
                Err(RpcError::new(
                    RpcError::FUNCTION_NOT_FOUND_ERR,
                    format!("method not found: {}", request.method),
                ))
            }
        };

        let msgid = request.msgid?;
        Some(match outcome {
            Ok(result) => Response::ok(msgid, result),
            Err(e) => Response::err(msgid, e),
        })
    }
}
