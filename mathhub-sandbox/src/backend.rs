//! Sandbox backend abstraction.
//!
//! Allows swapping between a worker process and an in-process thread
//! without changing the evaluation logic.

use async_trait::async_trait;

use mathhub_core::SandboxValue;

use crate::config::{ContextId, SandboxLimits};
use crate::error::SandboxError;

/// Allocates isolated runtimes.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Start a new runtime bounded by `limits`.
    ///
    /// # Errors
    /// Returns [`SandboxError::ResourceExhausted`] if the runtime cannot be
    /// allocated.
    async fn spawn(&self, limits: &SandboxLimits) -> Result<Box<dyn SandboxRuntime>, SandboxError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: SandboxBackend + ?Sized> SandboxBackend for Box<T> {
    async fn spawn(&self, limits: &SandboxLimits) -> Result<Box<dyn SandboxRuntime>, SandboxError> {
        (**self).spawn(limits).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// One running runtime, exclusively owned by a [`Sandbox`](crate::Sandbox).
///
/// Calls do not enforce a timeout themselves; the owning sandbox wraps
/// every call in its wall-clock budget and calls [`kill`](Self::kill) when
/// the budget runs out.
///
/// # Cancel Safety
/// Not cancel safe. A call dropped mid-flight leaves an unread reply
/// behind; the runtime must be killed afterwards.
#[async_trait]
pub trait SandboxRuntime: Send {
    /// Create a fresh, empty execution context.
    ///
    /// # Errors
    /// Returns [`SandboxError::ResourceExhausted`] if the runtime died.
    async fn create_context(&mut self, context: ContextId) -> Result<(), SandboxError>;

    /// Evaluate `source` to a function in `context` and call it with `args`.
    ///
    /// # Errors
    /// Returns the user-code, limit or marshaling error the runtime
    /// reported, or [`SandboxError::ResourceExhausted`] if it died.
    async fn run(
        &mut self,
        context: ContextId,
        source: &str,
        args: &[SandboxValue],
    ) -> Result<SandboxValue, SandboxError>;

    /// Shut the runtime down gracefully, releasing all its memory.
    ///
    /// # Errors
    /// Returns [`SandboxError::Io`] if the runtime could not be stopped.
    async fn terminate(&mut self) -> Result<(), SandboxError>;

    /// Stop the runtime immediately. Never blocks.
    fn kill(&mut self);
}
