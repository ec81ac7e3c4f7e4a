//! Sandboxed evaluation of quest functions.
//!
//! Author-supplied functions run inside an isolated script engine with a
//! hard memory ceiling, a per-call timeout and no host bindings. Only plain
//! data, deep-copied, crosses the boundary. Each request gets a fresh
//! sandbox that is disposed before its response is built.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod grading;
pub mod handle;
pub mod inline;
pub mod marshal;
mod nesting;
pub mod orchestrator;
pub mod process;
pub mod protocol;
pub mod resolver;
pub mod worker;

pub use backend::{SandboxBackend, SandboxRuntime};
pub use config::{ContextId, EngineLimits, SandboxLimits};
pub use error::{EntryField, EvaluationError, ResolveError, SandboxError};
pub use grading::{grade, GradeOutcome};
pub use handle::{Sandbox, SandboxState};
pub use inline::InlineBackend;
pub use orchestrator::{QuestEvaluator, SandboxRegistry};
pub use process::ProcessBackend;
