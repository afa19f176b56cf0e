//! Fuzz target: `Message::from_payload`
//!
//! Arbitrary payloads must decode or fail cleanly; anything that decodes
//! must survive re-framing.
//!
//! cargo fuzz run fuzz_message

#![no_main]

use libfuzzer_sys::fuzz_target;
use routerbridge::rpc::message::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = Message::from_payload(data) {
        let _ = msg.to_frame();
    }
});
