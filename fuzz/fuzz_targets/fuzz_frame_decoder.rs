//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, whole
//! and split at every third byte, and asserts both deliver the same frames.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use routerbridge::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE};

fuzz_target!(|data: &[u8]| {
    let mut whole = Vec::new();
    let mut decoder = FrameDecoder::new();
    decoder.feed(data, |payload| {
        assert!(!payload.is_empty(), "decoder must not yield empty payload");
        assert!(payload.len() <= MAX_FRAME_SIZE, "payload exceeds MAX_FRAME_SIZE");
        whole.push(payload.to_vec());
    });

    let mut split = Vec::new();
    decoder.reset();
    for chunk in data.chunks(3) {
        decoder.feed(chunk, |payload| split.push(payload.to_vec()));
    }
    assert_eq!(whole, split);
});
