//! Core types for the MathHub quest engine.
//!
//! Defines the stored entry model (questions, question variables, answers),
//! quest records, the plain value type that crosses the sandbox boundary,
//! and the canonical string form used for grading.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod canonical;
pub mod entry;
pub mod error;
pub mod id;
pub mod privilege;
pub mod quest;
pub mod samples;
pub mod value;

pub use canonical::format_number;
pub use entry::{
    AnswerEntry, AnswerKind, QuestionEntry, QuestionKind, QuestionVariableEntry, QuestionVariableKind,
};
pub use error::CoreError;
pub use id::{QuestId, SourceDigest, UserId};
pub use privilege::PrivilegeLevel;
pub use quest::{
    NewQuest, QueryRange, QuestContent, QuestRecord, QuestStatus, QuestSummary,
    ResolvedQuestionVariable,
};
pub use value::SandboxValue;
