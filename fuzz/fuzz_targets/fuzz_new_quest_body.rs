//! Fuzz target: `NewQuest` parsing, kind tag recognition and validation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mathhub_core::{NewQuest, UserId};

fuzz_target!(|data: &[u8]| {
    let Ok(submission) = serde_json::from_slice::<NewQuest>(data) else {
        return;
    };
    let valid = submission.validate().is_ok();
    let record = submission.into_record(UserId::new("fuzz"), "fuzz");
    assert_eq!(valid, record.is_ok(), "into_record must agree with validate");

    if let Ok(record) = record {
        // A stored record must survive its own serialization.
        let json = serde_json::to_string(&record).expect("record serialization must not fail");
        let back: mathhub_core::QuestRecord =
            serde_json::from_str(&json).expect("stored record must load back");
        assert_eq!(back.answer, record.answer);
    }
});
