#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_core::frame;

const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    let _ = frame::try_parse_line(data, MAX_LINE_BYTES);
});
