//! Grading of submitted answers against resolved ones.
//!
//! Pure: runs after the request's sandbox has been disposed.

use serde::Serialize;

use mathhub_core::SandboxValue;

/// Result of grading one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub is_correct: bool,
    pub message: String,
}

impl GradeOutcome {
    /// Wrap a verdict with its human-readable message.
    #[must_use]
    pub fn from_verdict(is_correct: bool) -> Self {
        let message = if is_correct { "Correct" } else { "Incorrect" };
        Self { is_correct, message: message.to_owned() }
    }
}

/// Whether `submitted` matches `resolved` entry by entry.
///
/// Values compare by their canonical string form, so the number `50` matches
/// the submitted text `"50"`. Lists of different lengths never match.
#[must_use]
pub fn grade(resolved: &[SandboxValue], submitted: &[SandboxValue]) -> bool {
    resolved.len() == submitted.len()
        && resolved
            .iter()
            .zip(submitted)
            .all(|(expected, given)| expected.canonical_string() == given.canonical_string())
}
