//! Fuzz target: `format_number` on arbitrary doubles.
//!
//! The text form of every finite number must parse back to the same value.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mathhub_core::format_number;

fuzz_target!(|data: [u8; 8]| {
    let value = f64::from_le_bytes(data);
    let text = format_number(value);
    if !value.is_finite() {
        return;
    }
    let parsed: f64 = text.parse().expect("finite output must parse as f64");
    assert_eq!(parsed, value, "'{text}' must round-trip");
});
