//! Fuzz target: `ChunkDecoder::poll`
//!
//! Drives arbitrary byte sequences into the streaming chunk decoder and
//! asserts that it never panics, never yields a payload larger than the
//! configured maximum, and accepts clean input again after a reset.
//!
//! cargo fuzz run fuzz_chunk_decoder

#![no_main]

use glowlink::chunked::{ChunkDecoder, encode_chunk};
use libfuzzer_sys::fuzz_target;

const MAX_FRAME: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let mut decoder = ChunkDecoder::new(MAX_FRAME);
    decoder.feed(data);

    // Drain until the decoder is empty, errors, or stalls.
    loop {
        match decoder.poll() {
            Ok(Some(payload)) => {
                assert!(payload.len() <= MAX_FRAME, "payload exceeds the frame cap");
                assert!(!payload.is_empty(), "decoder must not yield empty payloads");
            }
            Ok(None) | Err(_) => break,
        }
    }

    // After a reset the decoder must frame clean input again.
    decoder.reset();
    let mut wire = Vec::new();
    encode_chunk(b"{\"ping\":true}", &mut wire);
    decoder.feed(&wire);
    assert!(decoder.poll().expect("clean input").is_some());
});
