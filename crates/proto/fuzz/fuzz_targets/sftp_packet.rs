//! Fuzz target for SFTP packet parsing.
//!
//! This fuzzer tests the frame parser against random input to find:
//! - Panics
//! - Oversized allocations from hostile counts and lengths
//! - Frames that decode but do not re-encode identically
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run sftp_packet -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use sftpkit_proto::sftp::Packet;

fuzz_target!(|data: &[u8]| {
    // If parsing succeeds, ensure round-trip works
    if let Ok(packet) = Packet::from_bytes(data) {
        let serialized = packet.to_bytes();
        let reparsed =
            Packet::from_bytes(&serialized).expect("Round-trip parsing should never fail");

        assert_eq!(packet.message, reparsed.message);
        assert_eq!(packet.request_id, reparsed.request_id);
    }
});
