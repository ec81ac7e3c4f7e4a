//! Error types for the sandbox crate.

use std::fmt;

use uuid::Uuid;

use crate::config::ContextId;

/// Errors raised while creating, using or tearing down a sandbox.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SandboxError {
    /// The isolated environment could not be allocated, or died because it
    /// ran into its memory ceiling.
    #[error("sandbox resources exhausted: {reason}")]
    ResourceExhausted { reason: String },

    /// User code ran past its time or iteration budget.
    #[error("user code exceeded its time budget: {reason}")]
    ExecutionTimeout { reason: String },

    /// User code threw, did not evaluate to a function, or returned a value
    /// that cannot be used as an answer.
    #[error("user code failed: {message}")]
    UserCode { message: String },

    /// A value could not be copied across the sandbox boundary.
    #[error("value cannot cross the sandbox boundary: {reason}")]
    UnsupportedValueType { reason: String },

    /// The sandbox was already disposed.
    #[error("sandbox {0} has been disposed")]
    Disposed(Uuid),

    /// The sandbox hit a timeout or crash earlier and may not run more code.
    #[error("sandbox {0} is tainted and cannot run more code")]
    Tainted(Uuid),

    /// The context does not exist inside the sandbox.
    #[error("unknown context {0}")]
    UnknownContext(ContextId),

    /// The worker sent something that is not a valid reply.
    #[error("worker protocol error: {0}")]
    Protocol(String),

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Stable name of the error kind, used in API responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResourceExhausted { .. } => "ResourceExhausted",
            Self::ExecutionTimeout { .. } => "ExecutionTimeout",
            Self::UserCode { .. } => "UserCodeError",
            Self::UnsupportedValueType { .. } => "UnsupportedValueType",
            Self::Disposed(_) => "Disposed",
            Self::Tainted(_) => "Tainted",
            Self::UnknownContext(_) | Self::Protocol(_) | Self::Io(_) => "Internal",
        }
    }

    /// Whether the sandbox's internal state can no longer be trusted after
    /// this error.
    #[must_use]
    pub fn taints_sandbox(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. } | Self::ExecutionTimeout { .. } | Self::Protocol(_) | Self::Io(_)
        )
    }

    pub(crate) fn user_code(message: impl Into<String>) -> Self {
        Self::UserCode { message: message.into() }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedValueType { reason: reason.into() }
    }

    pub(crate) fn exhausted(reason: impl Into<String>) -> Self {
        Self::ResourceExhausted { reason: reason.into() }
    }
}

/// Which stored list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
    QuestionVariable,
    Answer,
}

impl fmt::Display for EntryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QuestionVariable => "question_var",
            Self::Answer => "answer",
        })
    }
}

/// A batch resolution aborted on one entry.
#[derive(Debug, thiserror::Error)]
#[error("{field} entry {index} could not be resolved: {source}")]
pub struct ResolveError {
    /// List the failing entry belongs to.
    pub field: EntryField,
    /// Position of the failing entry in its list.
    pub index: usize,
    /// What went wrong.
    #[source]
    pub source: SandboxError,
}

impl ResolveError {
    #[must_use]
    pub fn new(field: EntryField, index: usize, source: SandboxError) -> Self {
        Self { field, index, source }
    }
}

/// Failure of a whole content-resolution or grading request.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EvaluationError {
    /// The sandbox for the request could not be created.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// A dynamic field failed to resolve.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl EvaluationError {
    /// The underlying sandbox error, whichever stage raised it.
    #[must_use]
    pub fn sandbox_error(&self) -> &SandboxError {
        match self {
            Self::Sandbox(e) => e,
            Self::Resolve(e) => &e.source,
        }
    }
}
