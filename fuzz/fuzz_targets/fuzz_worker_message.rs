//! Fuzz target: decoding of worker protocol lines.
//!
//! The gateway reads whatever a worker writes, so malformed replies must
//! be rejected without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mathhub_sandbox::protocol::{WorkerRequest, WorkerResponse};

fuzz_target!(|data: &[u8]| {
    if let Ok(response) = serde_json::from_slice::<WorkerResponse>(data) {
        let _ = response.into_value();
    }
    let _ = serde_json::from_slice::<WorkerRequest>(data);
});
