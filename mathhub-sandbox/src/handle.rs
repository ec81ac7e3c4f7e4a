//! Sandbox handle: one isolated runtime and its lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use mathhub_core::SandboxValue;

use crate::backend::{SandboxBackend, SandboxRuntime};
use crate::config::{ContextId, SandboxLimits};
use crate::error::SandboxError;
use crate::orchestrator::SandboxRegistry;

/// Lifecycle state of a [`Sandbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Accepting calls.
    Live,
    /// A call timed out or the runtime died. The runtime has been killed;
    /// only [`Sandbox::dispose`] is still accepted.
    Tainted,
    /// Released. Every further call fails with [`SandboxError::Disposed`].
    Disposed,
}

/// A handle to one isolated runtime.
///
/// Exclusively owned by the request that created it. Call
/// [`dispose`](Self::dispose) when done; dropping a live handle kills the
/// runtime as a last resort and logs a warning.
pub struct Sandbox {
    id: Uuid,
    created_at: DateTime<Utc>,
    limits: SandboxLimits,
    runtime: Option<Box<dyn SandboxRuntime>>,
    state: SandboxState,
    next_context: u64,
    registry: SandboxRegistry,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("state", &self.state)
            .field("contexts", &self.next_context)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    /// Allocate a runtime from `backend` and register it in `registry`.
    ///
    /// # Errors
    /// Returns [`SandboxError::ResourceExhausted`] if the backend cannot
    /// allocate the runtime.
    pub async fn create(
        backend: &dyn SandboxBackend,
        limits: SandboxLimits,
        registry: SandboxRegistry,
    ) -> Result<Self, SandboxError> {
        let runtime = backend.spawn(&limits).await?;
        let id = Uuid::new_v4();
        registry.insert(id);
        tracing::info!(
            sandbox = %id,
            backend = backend.name(),
            memory_limit = limits.memory_limit_bytes,
            timeout_ms = u64::try_from(limits.timeout.as_millis()).unwrap_or(u64::MAX),
            "sandbox created"
        );
        Ok(Self {
            id,
            created_at: Utc::now(),
            limits,
            runtime: Some(runtime),
            state: SandboxState::Live,
            next_context: 0,
            registry,
        })
    }

    /// Unique identifier of this sandbox.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the sandbox was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Limits the sandbox was created with.
    #[must_use]
    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Create a fresh execution context with its own globals.
    ///
    /// # Errors
    /// - [`SandboxError::Disposed`] or [`SandboxError::Tainted`] if the
    ///   sandbox no longer accepts calls.
    /// - [`SandboxError::ExecutionTimeout`] if the runtime did not answer in
    ///   time, [`SandboxError::ResourceExhausted`] if it died.
    pub async fn create_context(&mut self) -> Result<ContextId, SandboxError> {
        let context = ContextId(self.next_context);
        let timeout = self.limits.timeout;
        let runtime = self.live_runtime()?;
        let outcome = tokio::time::timeout(timeout, runtime.create_context(context)).await;
        self.settle(outcome)?;
        self.next_context += 1;
        Ok(context)
    }

    /// Evaluate `source` to a function in `context` and call it with `args`.
    ///
    /// Arguments are deep-copied in and the result deep-copied out; nothing
    /// returned references the sandbox heap.
    ///
    /// # Errors
    /// - [`SandboxError::Disposed`] or [`SandboxError::Tainted`] if the
    ///   sandbox no longer accepts calls.
    /// - [`SandboxError::UnsupportedValueType`] if an argument or the result
    ///   cannot cross the boundary.
    /// - [`SandboxError::UserCode`] if the source is nested too deeply,
    ///   fails to compile, is not a function, throws, or returns `undefined`.
    /// - [`SandboxError::ExecutionTimeout`] if the call outlives the
    ///   per-call budget. The sandbox is tainted afterwards.
    /// - [`SandboxError::ResourceExhausted`] if the runtime died, typically
    ///   by hitting its memory ceiling. The sandbox is tainted afterwards.
    pub async fn compile_and_run(
        &mut self,
        context: ContextId,
        source: &str,
        args: &[SandboxValue],
    ) -> Result<SandboxValue, SandboxError> {
        let max_depth = self.limits.engine.max_marshal_depth;
        if let Some(arg) = args.iter().find(|arg| arg.depth() > max_depth) {
            self.ensure_live()?;
            return Err(SandboxError::unsupported(format!(
                "{} argument nested deeper than {max_depth} levels",
                arg.type_name()
            )));
        }

        let timeout = self.limits.timeout;
        let id = self.id;
        let runtime = self.live_runtime()?;
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(timeout, runtime.run(context, source, args)).await;
        let result = self.settle(outcome);
        tracing::debug!(
            sandbox = %id,
            %context,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            outcome = result.as_ref().map_or_else(SandboxError::kind, SandboxValue::type_name),
            "compile_and_run"
        );
        result
    }

    /// Release the runtime and every context in it.
    ///
    /// # Errors
    /// Returns [`SandboxError::Disposed`] if the sandbox was already disposed.
    pub async fn dispose(&mut self) -> Result<(), SandboxError> {
        if self.state == SandboxState::Disposed {
            return Err(SandboxError::Disposed(self.id));
        }
        let was_tainted = self.state == SandboxState::Tainted;
        self.state = SandboxState::Disposed;
        self.registry.release(self.id);

        if let Some(mut runtime) = self.runtime.take() {
            if was_tainted {
                runtime.kill();
            } else if let Err(e) = runtime.terminate().await {
                tracing::warn!(sandbox = %self.id, error = %e, "graceful shutdown failed, killing");
                runtime.kill();
            }
        }
        tracing::info!(
            sandbox = %self.id,
            tainted = was_tainted,
            lifetime_ms = (Utc::now() - self.created_at).num_milliseconds(),
            "sandbox disposed"
        );
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), SandboxError> {
        match self.state {
            SandboxState::Live => Ok(()),
            SandboxState::Tainted => Err(SandboxError::Tainted(self.id)),
            SandboxState::Disposed => Err(SandboxError::Disposed(self.id)),
        }
    }

    fn live_runtime(&mut self) -> Result<&mut Box<dyn SandboxRuntime>, SandboxError> {
        self.ensure_live()?;
        self.runtime.as_mut().ok_or(SandboxError::Disposed(self.id))
    }

    /// Apply the per-call timeout verdict and taint on fatal errors.
    fn settle<T>(
        &mut self,
        outcome: Result<Result<T, SandboxError>, tokio::time::error::Elapsed>,
    ) -> Result<T, SandboxError> {
        let result = outcome.unwrap_or_else(|_| {
            Err(SandboxError::ExecutionTimeout {
                reason: format!("call exceeded {}ms", self.limits.timeout.as_millis()),
            })
        });
        if let Err(e) = &result {
            if e.taints_sandbox() {
                tracing::warn!(sandbox = %self.id, kind = e.kind(), error = %e, "sandbox tainted");
                self.state = SandboxState::Tainted;
                if let Some(runtime) = self.runtime.as_mut() {
                    runtime.kill();
                }
            }
        }
        result
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.state == SandboxState::Disposed {
            return;
        }
        tracing::warn!(sandbox = %self.id, "sandbox dropped without dispose, killing runtime");
        if let Some(mut runtime) = self.runtime.take() {
            runtime.kill();
        }
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::InlineBackend;

    /// Runtime whose calls never finish.
    struct HangingBackend;

    struct HangingRuntime;

    #[async_trait]
    impl SandboxBackend for HangingBackend {
        async fn spawn(&self, _limits: &SandboxLimits) -> Result<Box<dyn SandboxRuntime>, SandboxError> {
            Ok(Box::new(HangingRuntime))
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    #[async_trait]
    impl SandboxRuntime for HangingRuntime {
        async fn create_context(&mut self, _context: ContextId) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn run(
            &mut self,
            _context: ContextId,
            _source: &str,
            _args: &[SandboxValue],
        ) -> Result<SandboxValue, SandboxError> {
            std::future::pending().await
        }

        async fn terminate(&mut self) -> Result<(), SandboxError> {
            Ok(())
        }

        fn kill(&mut self) {}
    }

    async fn sandbox(backend: &dyn SandboxBackend, limits: SandboxLimits) -> (Sandbox, SandboxRegistry) {
        let registry = SandboxRegistry::default();
        match Sandbox::create(backend, limits, registry.clone()).await {
            Ok(s) => (s, registry),
            Err(e) => panic!("sandbox creation failed: {e}"),
        }
    }

    #[tokio::test]
    async fn compile_and_run_in_fresh_context() {
        let (mut sandbox, _registry) = sandbox(&InlineBackend::new(), SandboxLimits::default()).await;
        let ctx = match sandbox.create_context().await {
            Ok(c) => c,
            Err(e) => panic!("create_context failed: {e}"),
        };
        let result = sandbox.compile_and_run(ctx, "() => 2 + 3", &[]).await;
        assert_eq!(result.ok(), Some(SandboxValue::from(5)));
        assert!(sandbox.dispose().await.is_ok());
    }

    #[tokio::test]
    async fn calls_after_dispose_fail_deterministically() {
        let (mut sandbox, registry) = sandbox(&InlineBackend::new(), SandboxLimits::default()).await;
        assert_eq!(registry.len(), 1);
        assert!(sandbox.dispose().await.is_ok());
        assert_eq!(registry.len(), 0, "dispose must release the registry entry");

        let id = sandbox.id();
        assert!(matches!(sandbox.dispose().await, Err(SandboxError::Disposed(d)) if d == id));
        assert!(matches!(sandbox.create_context().await, Err(SandboxError::Disposed(_))));
        assert!(matches!(
            sandbox.compile_and_run(ContextId(0), "() => 1", &[]).await,
            Err(SandboxError::Disposed(_))
        ));
    }

    #[tokio::test]
    async fn timeout_taints_and_kills() {
        let limits = SandboxLimits::default().with_timeout(Duration::from_millis(50));
        let (mut sandbox, _registry) = sandbox(&HangingBackend, limits).await;
        let ctx = match sandbox.create_context().await {
            Ok(c) => c,
            Err(e) => panic!("create_context failed: {e}"),
        };
        let result = sandbox.compile_and_run(ctx, "() => 1", &[]).await;
        assert!(matches!(result, Err(SandboxError::ExecutionTimeout { .. })), "got {result:?}");
        assert_eq!(sandbox.state(), SandboxState::Tainted);

        let again = sandbox.compile_and_run(ctx, "() => 1", &[]).await;
        assert!(matches!(again, Err(SandboxError::Tainted(_))), "got {again:?}");
        assert!(sandbox.dispose().await.is_ok(), "a tainted sandbox can still be disposed");
    }

    #[tokio::test]
    async fn user_errors_do_not_taint() {
        let (mut sandbox, _registry) = sandbox(&InlineBackend::new(), SandboxLimits::default()).await;
        let ctx = match sandbox.create_context().await {
            Ok(c) => c,
            Err(e) => panic!("create_context failed: {e}"),
        };
        let failed = sandbox.compile_and_run(ctx, "() => { throw 1; }", &[]).await;
        assert!(matches!(failed, Err(SandboxError::UserCode { .. })), "got {failed:?}");
        assert_eq!(sandbox.state(), SandboxState::Live);
        let ok = sandbox.compile_and_run(ctx, "() => 'still usable'", &[]).await;
        assert!(ok.is_ok(), "got {ok:?}");
        assert!(sandbox.dispose().await.is_ok());
    }

    #[tokio::test]
    async fn over_deep_argument_is_unsupported() {
        let mut limits = SandboxLimits::default();
        limits.engine.max_marshal_depth = 2;
        let (mut sandbox, _registry) = sandbox(&InlineBackend::new(), limits).await;
        let deep = SandboxValue::from(serde_json::json!([[[1]]]));
        let result = sandbox.compile_and_run(ContextId(0), "(x) => x", &[deep]).await;
        assert!(matches!(result, Err(SandboxError::UnsupportedValueType { .. })), "got {result:?}");
        assert_eq!(sandbox.state(), SandboxState::Live);
        assert!(sandbox.dispose().await.is_ok());
    }

    #[tokio::test]
    async fn drop_without_dispose_releases_registry() {
        let (sandbox, registry) = sandbox(&InlineBackend::new(), SandboxLimits::default()).await;
        assert_eq!(registry.len(), 1);
        drop(sandbox);
        assert!(registry.is_empty());
    }
}
