//! Fuzz target for inbound line handling
//!
//! Feeds arbitrary bytes through the line framer, then every decoded line
//! through the parser and channel tracker. None of them may panic.

#![no_main]

use bytes::BytesMut;
use ircbot_core::{ChannelTracker, LineCodec, LineParser};
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = LineCodec::new();
    let parser = LineParser::new();
    let mut tracker = ChannelTracker::new();
    let mut buf = BytesMut::from(data);

    while let Ok(Some(line)) = codec.decode_eof(&mut buf) {
        if let Some(event) = parser.parse(&line, "snaibot") {
            tracker.apply(&event, "snaibot");
        }
    }

    // Outbound sanitization must never panic either
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = LineCodec::sanitize(input);
    }
});
