//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against a simulated router on an in-memory link. All tests run on the
//! host (x86_64) with no real hardware required.

mod bridge_tests;
mod dispatch_tests;
mod mock_router;
mod pending_call_tests;
