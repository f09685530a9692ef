//! Fuzz target for the attribute block decoder.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run file_attrs
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use sftpkit_proto::sftp::FileAttrs;

fuzz_target!(|data: &[u8]| {
    if let Ok((attrs, consumed)) = FileAttrs::from_bytes(data) {
        assert!(consumed <= data.len());

        let encoded = attrs.to_bytes();
        let (again, used) =
            FileAttrs::from_bytes(&encoded).expect("re-encoded attrs must decode");
        assert_eq!(used, encoded.len());
        assert_eq!(again, attrs);
    }
});
