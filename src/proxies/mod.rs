//! Proxies: typed clients for co-processor services.
//!
//! Each proxy owns a [`Bridge`] clone, serialises its own state behind a
//! local lock and brings the bridge up on first use.
//!
//! | Proxy        | Methods         |
//! |--------------|-----------------|
//! | `wifi`       | `wifi/*`        |
//! | `tcp`        | `tcp/*`         |
//! | `udp`        | `udp/*`         |
//! | `monitor`    | `mon/*`         |

pub mod monitor;
pub mod tcp;
pub mod udp;
pub mod wifi;

use log::warn;

use crate::bridge::Bridge;

/// Start `bridge` if needed. Returns whether it is ready afterwards.
pub(crate) fn ensure_ready(bridge: &Bridge) -> bool {
    if bridge.is_ready() {
        return true;
    }
    match bridge.begin() {
        Ok(()) => true,
        Err(e) => {
            warn!("PROXY: bridge start failed: {}", e);
            false
        }
    }
}
