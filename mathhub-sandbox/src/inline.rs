//! In-process backend for development and tests.
//!
//! Each sandbox gets a dedicated engine thread inside the host process.
//! Contexts are still isolated from each other and from the host, and loop
//! and call-depth limits still apply, but there is no hard memory ceiling
//! and a timed-out thread can only be abandoned, not stopped. Abandoned
//! threads count against the backend's thread cap until they finish, so a
//! stream of runaway calls ends in refused spawns instead of an unbounded
//! pile of threads. Production deployments use
//! [`ProcessBackend`](crate::ProcessBackend).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use async_trait::async_trait;
use tokio::sync::oneshot;

use mathhub_core::SandboxValue;

use crate::backend::{SandboxBackend, SandboxRuntime};
use crate::config::{ContextId, EngineLimits, SandboxLimits};
use crate::engine::ScriptEngine;
use crate::error::SandboxError;

/// Native stack of an engine thread. The parser recurses on nested input.
const ENGINE_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Engine threads one backend keeps alive at once, abandoned ones included.
pub const DEFAULT_MAX_INLINE_THREADS: usize = 32;

static THREAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Runs every sandbox on its own thread in this process.
#[derive(Debug, Clone)]
pub struct InlineBackend {
    threads: Arc<AtomicUsize>,
    max_threads: usize,
}

impl Default for InlineBackend {
    fn default() -> Self {
        Self { threads: Arc::new(AtomicUsize::new(0)), max_threads: DEFAULT_MAX_INLINE_THREADS }
    }
}

impl InlineBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how many engine threads may be alive at once.
    #[must_use]
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Engine threads currently alive, including abandoned ones.
    #[must_use]
    pub fn live_threads(&self) -> usize {
        self.threads.load(Ordering::Acquire)
    }

    fn claim_thread(&self) -> Result<ThreadSlot, SandboxError> {
        self.threads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max_threads).then_some(n + 1))
            .map_err(|n| SandboxError::exhausted(format!("{n} inline engine threads still running")))?;
        Ok(ThreadSlot(Arc::clone(&self.threads)))
    }
}

/// One claimed unit of the thread cap, released when the engine thread ends.
struct ThreadSlot(Arc<AtomicUsize>);

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

enum Command {
    CreateContext {
        context: ContextId,
        reply: oneshot::Sender<Result<(), SandboxError>>,
    },
    Run {
        context: ContextId,
        source: String,
        args: Vec<SandboxValue>,
        reply: oneshot::Sender<Result<SandboxValue, SandboxError>>,
    },
}

fn engine_loop(limits: EngineLimits, commands: &mpsc::Receiver<Command>) {
    let mut engine = ScriptEngine::new(limits);
    while let Ok(command) = commands.recv() {
        // A dropped receiver means the caller gave up waiting.
        match command {
            Command::CreateContext { context, reply } => {
                let _ = reply.send(engine.create_context(context));
            }
            Command::Run { context, source, args, reply } => {
                let _ = reply.send(engine.run(context, &source, &args));
            }
        }
    }
}

#[async_trait]
impl SandboxBackend for InlineBackend {
    async fn spawn(&self, limits: &SandboxLimits) -> Result<Box<dyn SandboxRuntime>, SandboxError> {
        let slot = self.claim_thread()?;
        let (sender, receiver) = mpsc::channel();
        let engine_limits = limits.engine;
        let seq = THREAD_SEQ.fetch_add(1, Ordering::Relaxed);
        // A failed spawn drops the closure and with it the slot.
        let thread = std::thread::Builder::new()
            .name(format!("mathhub-inline-{seq}"))
            .stack_size(ENGINE_STACK_BYTES)
            .spawn(move || {
                let _slot = slot;
                engine_loop(engine_limits, &receiver);
            })
            .map_err(|e| SandboxError::exhausted(format!("cannot start engine thread: {e}")))?;
        Ok(Box::new(InlineRuntime { commands: Some(sender), thread: Some(thread) }))
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

struct InlineRuntime {
    commands: Option<mpsc::Sender<Command>>,
    thread: Option<JoinHandle<()>>,
}

impl InlineRuntime {
    fn send(&self, command: Command) -> Result<(), SandboxError> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| SandboxError::exhausted("engine thread already stopped"))?;
        commands
            .send(command)
            .map_err(|_| SandboxError::exhausted("engine thread is gone"))
    }
}

#[async_trait]
impl SandboxRuntime for InlineRuntime {
    async fn create_context(&mut self, context: ContextId) -> Result<(), SandboxError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::CreateContext { context, reply })?;
        response
            .await
            .map_err(|_| SandboxError::exhausted("engine thread died"))?
    }

    async fn run(
        &mut self,
        context: ContextId,
        source: &str,
        args: &[SandboxValue],
    ) -> Result<SandboxValue, SandboxError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Run { context, source: source.to_owned(), args: args.to_vec(), reply })?;
        response
            .await
            .map_err(|_| SandboxError::exhausted("engine thread died"))?
    }

    async fn terminate(&mut self) -> Result<(), SandboxError> {
        self.commands = None;
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| SandboxError::Protocol(format!("join task failed: {e}")))?;
            if joined.is_err() {
                tracing::warn!("engine thread panicked");
            }
        }
        Ok(())
    }

    fn kill(&mut self) {
        // The thread finishes its current call (bounded by the loop limit)
        // and then exits on the closed channel, releasing its slot.
        self.commands = None;
        if self.thread.take().is_some() {
            tracing::debug!("inline engine thread abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_runtime_runs_functions() {
        let mut runtime = match InlineBackend::new().spawn(&SandboxLimits::default()).await {
            Ok(r) => r,
            Err(e) => panic!("spawn failed: {e}"),
        };
        if let Err(e) = runtime.create_context(ContextId(0)).await {
            panic!("create_context failed: {e}");
        }
        let result = runtime.run(ContextId(0), "(a, b) => a + b", &[1.into(), 2.into()]).await;
        assert_eq!(result.ok(), Some(SandboxValue::from(3)));
        assert!(runtime.terminate().await.is_ok());
    }

    #[tokio::test]
    async fn killed_runtime_reports_exhaustion() {
        let mut runtime = match InlineBackend::new().spawn(&SandboxLimits::default()).await {
            Ok(r) => r,
            Err(e) => panic!("spawn failed: {e}"),
        };
        runtime.kill();
        let result = runtime.create_context(ContextId(0)).await;
        assert!(matches!(result, Err(SandboxError::ResourceExhausted { .. })), "got {result:?}");
    }

    #[tokio::test]
    async fn nested_source_fails_without_losing_the_thread() {
        let mut runtime = match InlineBackend::new().spawn(&SandboxLimits::default()).await {
            Ok(r) => r,
            Err(e) => panic!("spawn failed: {e}"),
        };
        if let Err(e) = runtime.create_context(ContextId(0)).await {
            panic!("create_context failed: {e}");
        }
        let nested = format!("() => {}1{}", "[".repeat(8000), "]".repeat(8000));
        let result = runtime.run(ContextId(0), &nested, &[]).await;
        assert!(matches!(result, Err(SandboxError::UserCode { .. })), "got {result:?}");
        let result = runtime.run(ContextId(0), "() => 'still here'", &[]).await;
        assert_eq!(result.ok(), Some(SandboxValue::from("still here")));
        assert!(runtime.terminate().await.is_ok());
    }

    #[tokio::test]
    async fn thread_cap_refuses_spawns_until_a_thread_ends() {
        let backend = InlineBackend::new().with_max_threads(1);
        let mut first = match backend.spawn(&SandboxLimits::default()).await {
            Ok(r) => r,
            Err(e) => panic!("spawn failed: {e}"),
        };
        assert_eq!(backend.live_threads(), 1);
        let refused = backend.spawn(&SandboxLimits::default()).await;
        assert!(matches!(refused, Err(SandboxError::ResourceExhausted { .. })), "second spawn must be refused");

        assert!(first.terminate().await.is_ok());
        assert_eq!(backend.live_threads(), 0, "a joined thread releases its slot");
        let second = backend.spawn(&SandboxLimits::default()).await;
        assert!(second.is_ok(), "spawn after terminate must succeed");
    }
}
