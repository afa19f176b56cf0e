//! Adapters: concrete implementations of the link traits.
//!
//! | Adapter | Implements  | Connects to          |
//! |---------|-------------|----------------------|
//! | `uart`  | Transport   | ESP32 UART to router |

#[cfg(target_os = "espidf")]
pub mod uart;
