//! Sandbox limits and context identifier types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default memory ceiling for one sandbox: 128 MiB.
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 128 * 1024 * 1024;

/// Default per-call wall-clock budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Address space the worker binary needs on top of the script heap
/// (executable image, shared libraries, main thread stack).
pub const DEFAULT_WORKER_OVERHEAD_BYTES: u64 = 64 * 1024 * 1024;

/// Limits enforced by the script engine itself, inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct EngineLimits {
    /// Iterations any single loop may run before it is aborted.
    pub loop_iteration_limit: u64,
    /// Maximum call depth of user code.
    pub recursion_limit: usize,
    /// Maximum number of slots on the engine's value stack.
    pub stack_size_limit: usize,
    /// Largest accepted function source, in bytes.
    pub max_source_bytes: usize,
    /// Deepest syntactic nesting accepted in a function source. The parser
    /// recurses once per level, so this bounds its native stack use.
    pub max_source_nesting: usize,
    /// Deepest nesting of arrays/objects copied across the boundary.
    pub max_marshal_depth: usize,
    /// Most array elements plus object properties copied out of one result.
    pub max_marshal_nodes: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 100_000_000,
            recursion_limit: 400,
            stack_size_limit: 10 * 1024,
            max_source_bytes: 64 * 1024,
            max_source_nesting: 256,
            max_marshal_depth: 32,
            max_marshal_nodes: 100_000,
        }
    }
}

impl EngineLimits {
    /// Override the per-loop iteration budget.
    #[must_use]
    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = limit;
        self
    }

    /// Override the accepted source size.
    #[must_use]
    pub fn with_max_source_bytes(mut self, bytes: usize) -> Self {
        self.max_source_bytes = bytes;
        self
    }

    /// Override the accepted source nesting depth.
    #[must_use]
    pub fn with_max_source_nesting(mut self, depth: usize) -> Self {
        self.max_source_nesting = depth;
        self
    }

    /// Override the marshaling depth limit.
    #[must_use]
    pub fn with_max_marshal_depth(mut self, depth: usize) -> Self {
        self.max_marshal_depth = depth;
        self
    }
}

/// Resource limits for one sandbox instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SandboxLimits {
    /// Hard memory ceiling for the script heap, in bytes.
    pub memory_limit_bytes: u64,

    /// Extra address space granted to a worker process for its own image.
    pub worker_overhead_bytes: u64,

    /// Wall-clock budget of every single call into the sandbox.
    pub timeout: Duration,

    /// Limits applied by the engine.
    pub engine: EngineLimits,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            worker_overhead_bytes: DEFAULT_WORKER_OVERHEAD_BYTES,
            timeout: DEFAULT_TIMEOUT,
            engine: EngineLimits::default(),
        }
    }
}

impl SandboxLimits {
    /// Create limits with the given memory ceiling and per-call timeout.
    #[must_use]
    pub fn new(memory_limit_bytes: u64, timeout: Duration) -> Self {
        Self { memory_limit_bytes, timeout, ..Self::default() }
    }

    /// Override the memory ceiling, in mebibytes.
    #[must_use]
    pub fn with_memory_limit_mib(mut self, mib: u64) -> Self {
        self.memory_limit_bytes = mib.saturating_mul(1024 * 1024);
        self
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the engine limits.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineLimits) -> Self {
        self.engine = engine;
        self
    }

    /// Address-space ceiling applied to a worker process.
    #[must_use]
    pub fn worker_address_space_bytes(&self) -> u64 {
        self.memory_limit_bytes.saturating_add(self.worker_overhead_bytes)
    }
}

/// Identifies one execution context inside a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let limits = SandboxLimits::default();
        assert_eq!(limits.memory_limit_bytes, 128 * 1024 * 1024);
        assert_eq!(limits.timeout, Duration::from_secs(2));
    }

    #[test]
    fn worker_address_space_adds_overhead() {
        let limits = SandboxLimits::default().with_memory_limit_mib(64);
        assert_eq!(limits.worker_address_space_bytes(), 128 * 1024 * 1024);
    }

    #[test]
    fn limits_round_trip_through_json() {
        let limits = SandboxLimits::new(1024, Duration::from_millis(250))
            .with_engine(EngineLimits::default().with_loop_iteration_limit(10));
        let json = match serde_json::to_string(&limits) {
            Ok(s) => s,
            Err(e) => panic!("serialization failed: {e}"),
        };
        let back: SandboxLimits = match serde_json::from_str(&json) {
            Ok(l) => l,
            Err(e) => panic!("deserialization failed: {e}"),
        };
        assert_eq!(back, limits);
    }
}
