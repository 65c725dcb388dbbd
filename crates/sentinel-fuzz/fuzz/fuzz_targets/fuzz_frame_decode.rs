#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_core::frame;

fuzz_target!(|data: &[u8]| {
    let _ = frame::decode(data);
});
