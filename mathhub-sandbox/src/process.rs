//! Worker-process backend.
//!
//! Every sandbox is a separate `mathhub-worker` process started with an
//! empty environment and a hard address-space ceiling. The script heap
//! lives entirely inside that process, so exceeding the ceiling kills the
//! worker and nothing else, and killing the worker reclaims every byte.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use mathhub_core::SandboxValue;

use crate::backend::{SandboxBackend, SandboxRuntime};
use crate::config::{ContextId, SandboxLimits};
use crate::error::SandboxError;
use crate::protocol::{WireValue, WorkerRequest, WorkerResponse, MAX_REPLY_BYTES};

/// File name of the worker binary.
pub const WORKER_BINARY: &str = "mathhub-worker";

/// How long a fresh worker may take to answer its configuration.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a terminating worker may take to exit before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Spawns one worker process per sandbox.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    worker_path: PathBuf,
    handshake_timeout: Duration,
}

impl ProcessBackend {
    /// Create a backend that runs the worker binary at `worker_path`.
    #[must_use]
    pub fn new(worker_path: impl Into<PathBuf>) -> Self {
        Self { worker_path: worker_path.into(), handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT }
    }

    /// Use the worker binary installed next to the running executable.
    ///
    /// # Errors
    /// Returns an I/O error if the current executable cannot be located.
    pub fn sibling_worker() -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self::new(dir.join(WORKER_BINARY)))
    }

    /// Override the startup handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Path of the worker binary.
    #[must_use]
    pub fn worker_path(&self) -> &Path {
        &self.worker_path
    }

    #[cfg(unix)]
    fn command(&self, limits: &SandboxLimits) -> Command {
        let mut command = self.base_command();
        let address_space = limits.worker_address_space_bytes();
        // SAFETY: the hook only calls getrlimit, setrlimit and signal, which
        // are async-signal-safe, and allocates nothing.
        unsafe {
            command.pre_exec(move || rlimits::apply(address_space));
        }
        command
    }

    #[cfg(not(unix))]
    fn command(&self, _limits: &SandboxLimits) -> Command {
        self.base_command()
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.worker_path);
        command
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Ok(filter) = std::env::var("RUST_LOG") {
            command.env("RUST_LOG", filter);
        }
        command
    }
}

#[async_trait]
impl SandboxBackend for ProcessBackend {
    async fn spawn(&self, limits: &SandboxLimits) -> Result<Box<dyn SandboxRuntime>, SandboxError> {
        if cfg!(not(unix)) {
            return Err(SandboxError::exhausted("the process backend requires a unix host"));
        }

        let mut child = self.command(limits).spawn().map_err(|e| {
            SandboxError::exhausted(format!("cannot start {}: {e}", self.worker_path.display()))
        })?;
        let stdin = child.stdin.take().ok_or_else(|| SandboxError::exhausted("worker stdin not piped"))?;
        let stdout =
            child.stdout.take().ok_or_else(|| SandboxError::exhausted("worker stdout not piped"))?;

        let mut runtime = ProcessRuntime {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            line: String::new(),
        };
        let pid = runtime.child.id();

        let configure = WorkerRequest::Configure { limits: limits.engine };
        let handshake = match tokio::time::timeout(self.handshake_timeout, runtime.exchange(&configure)).await {
            Ok(reply) => reply.and_then(WorkerResponse::into_ready),
            Err(_) => Err(SandboxError::exhausted(format!(
                "worker did not answer within {}ms",
                self.handshake_timeout.as_millis()
            ))),
        };
        if let Err(e) = handshake {
            runtime.kill();
            tracing::warn!(pid = ?pid, error = %e, "worker handshake failed");
            return Err(match e {
                SandboxError::ResourceExhausted { .. } => e,
                other => SandboxError::exhausted(format!("worker handshake failed: {other}")),
            });
        }

        tracing::debug!(
            pid = ?pid,
            address_space = limits.worker_address_space_bytes(),
            "worker ready"
        );
        Ok(Box::new(runtime))
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// A running worker process and its pipes.
struct ProcessRuntime {
    child: Child,
    /// `None` once the input side has been closed.
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    line: String,
}

impl ProcessRuntime {
    /// Send one request line and read one reply line.
    async fn exchange(&mut self, request: &WorkerRequest) -> Result<WorkerResponse, SandboxError> {
        let mut payload = serde_json::to_vec(request).map_err(|e| SandboxError::Protocol(e.to_string()))?;
        payload.push(b'\n');

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SandboxError::exhausted("worker input is closed"));
        };
        let written = match stdin.write_all(&payload).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            return Err(self.died(&e.to_string()));
        }

        self.line.clear();
        let read = (&mut self.stdout).take(MAX_REPLY_BYTES).read_line(&mut self.line).await?;
        if read == 0 {
            return Err(self.died("end of output"));
        }
        if !self.line.ends_with('\n') {
            return Err(SandboxError::Protocol(format!("reply exceeds {MAX_REPLY_BYTES} bytes")));
        }
        serde_json::from_str(&self.line).map_err(|e| SandboxError::Protocol(format!("bad reply: {e}")))
    }

    /// Describe an unexpectedly dead worker. A worker that runs into its
    /// address-space ceiling aborts, so death means exhaustion.
    fn died(&mut self, detail: &str) -> SandboxError {
        let status = match self.child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            Ok(None) => "still running".to_owned(),
            Err(e) => e.to_string(),
        };
        SandboxError::exhausted(format!("worker died ({status}): {detail}"))
    }
}

#[async_trait]
impl SandboxRuntime for ProcessRuntime {
    async fn create_context(&mut self, context: ContextId) -> Result<(), SandboxError> {
        self.exchange(&WorkerRequest::CreateContext { context }).await?.into_ready()
    }

    async fn run(
        &mut self,
        context: ContextId,
        source: &str,
        args: &[SandboxValue],
    ) -> Result<SandboxValue, SandboxError> {
        let request = WorkerRequest::Run {
            context,
            source: source.to_owned(),
            args: args.iter().map(WireValue::from).collect(),
        };
        self.exchange(&request).await?.into_value()
    }

    async fn terminate(&mut self) -> Result<(), SandboxError> {
        // Closing stdin ends the worker's request loop.
        self.stdin = None;
        match tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%status, "worker exited");
                Ok(())
            }
            Ok(Err(e)) => Err(SandboxError::Io(e)),
            Err(_) => {
                tracing::debug!("worker ignored shutdown, killing");
                self.child.kill().await.map_err(SandboxError::Io)
            }
        }
    }

    fn kill(&mut self) {
        self.stdin = None;
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "worker already gone");
        }
    }
}

#[cfg(unix)]
mod rlimits {
    use std::io;

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    type Resource = libc::c_int;

    /// File descriptors a worker may hold: stdio plus a little slack.
    const MAX_OPEN_FILES: u64 = 16;

    /// Applied in the forked child before `exec`.
    ///
    /// `RLIMIT_FSIZE` is zero, so `SIGXFSZ` is ignored: a write to a
    /// redirected stderr then fails with `EFBIG` instead of killing the
    /// worker.
    pub(super) fn apply(address_space_bytes: u64) -> io::Result<()> {
        set(libc::RLIMIT_AS, address_space_bytes)?;
        set(libc::RLIMIT_CORE, 0)?;
        set(libc::RLIMIT_FSIZE, 0)?;
        set(libc::RLIMIT_NOFILE, MAX_OPEN_FILES)?;
        // SAFETY: installing SIG_IGN is async-signal-safe and survives exec.
        if unsafe { libc::signal(libc::SIGXFSZ, libc::SIG_IGN) } == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Lower both the soft and hard limit, never above the inherited hard limit.
    fn set(resource: Resource, value: u64) -> io::Result<()> {
        let mut current = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        // SAFETY: `current` is a valid, writable rlimit.
        if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let value = libc::rlim_t::try_from(value).unwrap_or(libc::RLIM_INFINITY).min(current.rlim_max);
        let limit = libc::rlimit { rlim_cur: value, rlim_max: value };
        // SAFETY: `limit` is a valid rlimit that outlives the call.
        if unsafe { libc::setrlimit(resource, &limit) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_worker_binary_is_resource_exhaustion() {
        let backend = ProcessBackend::new("/nonexistent/mathhub-worker");
        let result = backend.spawn(&SandboxLimits::default()).await;
        assert!(
            matches!(result, Err(SandboxError::ResourceExhausted { .. })),
            "spawn of a missing binary must report ResourceExhausted"
        );
    }

    #[test]
    fn sibling_worker_sits_next_to_current_exe() {
        let backend = match ProcessBackend::sibling_worker() {
            Ok(b) => b,
            Err(e) => panic!("current_exe failed: {e}"),
        };
        assert_eq!(backend.worker_path().file_name().and_then(|n| n.to_str()), Some(WORKER_BINARY));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn worker_that_exits_immediately_fails_handshake() {
        let backend = ProcessBackend::new("/bin/true").with_handshake_timeout(Duration::from_secs(2));
        let result = backend.spawn(&SandboxLimits::default()).await;
        assert!(
            matches!(result, Err(SandboxError::ResourceExhausted { .. })),
            "a worker that never answers must report ResourceExhausted"
        );
    }
}
