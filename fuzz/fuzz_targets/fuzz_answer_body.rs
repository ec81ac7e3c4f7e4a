//! Fuzz target: JSON deserialization of `AnswerQuestBody` and canonical
//! string conversion of the submitted values.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mathhub_core::SandboxValue;
use mathhub_gateway::routes::AnswerQuestBody;

fuzz_target!(|data: &[u8]| {
    // Errors are expected; only panics are bugs.
    let Ok(body) = serde_json::from_slice::<AnswerQuestBody>(data) else {
        return;
    };
    for value in body.answer.into_iter().chain(body.question_var.into_iter().flatten()) {
        let value = SandboxValue::from_json(value);
        let _ = value.canonical_string();
        let _ = value.depth();
    }
});
