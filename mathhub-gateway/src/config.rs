//! Gateway configuration, read from `MATHHUB_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use mathhub_sandbox::{InlineBackend, ProcessBackend, QuestEvaluator, SandboxBackend, SandboxLimits};

/// Evaluator type shared by every route.
pub type SharedEvaluator = Arc<QuestEvaluator<Box<dyn SandboxBackend>>>;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_MEMORY_MIB: u64 = 128;
const DEFAULT_TIMEOUT_MS: u64 = 2_000;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable was set to something that does not parse.
    #[error("{name} has invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },

    /// The worker binary could not be located next to the gateway.
    #[error("cannot locate the sandbox worker: {0}")]
    WorkerPath(#[source] std::io::Error),
}

/// Which sandbox backend serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// One worker process per request, with an OS memory ceiling.
    #[default]
    Process,
    /// One engine thread per request inside the gateway process.
    Inline,
}

impl FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "inline" => Ok(Self::Inline),
            _ => Err(()),
        }
    }
}

/// Settings for one gateway instance.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub backend: BackendKind,
    pub limits: SandboxLimits,
    /// Worker binary; defaults to `mathhub-worker` next to the gateway.
    pub worker_path: Option<PathBuf>,
    /// Optional JSON array of quests loaded at startup.
    pub seed_file: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            backend: BackendKind::default(),
            limits: SandboxLimits::default()
                .with_memory_limit_mib(DEFAULT_MEMORY_MIB)
                .with_timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            worker_path: None,
            seed_file: None,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for a variable that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value
    /// or `None` when unset. Empty values count as unset.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for a variable that does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("MATHHUB_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(value) = get("MATHHUB_SANDBOX_BACKEND") {
            config.backend = value
                .parse()
                .map_err(|()| ConfigError::InvalidValue { name: "MATHHUB_SANDBOX_BACKEND", value })?;
        }
        if let Some(value) = get("MATHHUB_SANDBOX_MEMORY_MIB") {
            let mib = parse_positive("MATHHUB_SANDBOX_MEMORY_MIB", value)?;
            config.limits = config.limits.with_memory_limit_mib(mib);
        }
        if let Some(value) = get("MATHHUB_SANDBOX_TIMEOUT_MS") {
            let ms = parse_positive("MATHHUB_SANDBOX_TIMEOUT_MS", value)?;
            config.limits = config.limits.with_timeout(Duration::from_millis(ms));
        }
        config.worker_path = get("MATHHUB_WORKER_PATH").map(PathBuf::from);
        config.seed_file = get("MATHHUB_SEED_FILE").map(PathBuf::from);
        Ok(config)
    }

    /// Build the evaluator for the configured backend.
    ///
    /// # Errors
    /// Returns [`ConfigError::WorkerPath`] if the process backend is selected,
    /// no worker path is configured and the gateway's own location is unknown.
    pub fn evaluator(&self) -> Result<SharedEvaluator, ConfigError> {
        let backend: Box<dyn SandboxBackend> = match self.backend {
            BackendKind::Inline => {
                tracing::warn!(
                    max_threads = mathhub_sandbox::inline::DEFAULT_MAX_INLINE_THREADS,
                    "inline sandbox backend has no memory ceiling and cannot stop timed-out calls; \
                     use the process backend outside development"
                );
                Box::new(InlineBackend::new())
            }
            BackendKind::Process => match &self.worker_path {
                Some(path) => Box::new(ProcessBackend::new(path.clone())),
                None => Box::new(ProcessBackend::sibling_worker().map_err(ConfigError::WorkerPath)?),
            },
        };
        tracing::info!(
            backend = backend.name(),
            memory_mib = self.limits.memory_limit_bytes / (1024 * 1024),
            timeout_ms = u64::try_from(self.limits.timeout.as_millis()).unwrap_or(u64::MAX),
            "sandbox backend configured"
        );
        Ok(Arc::new(QuestEvaluator::new(backend, self.limits.clone())))
    }
}

fn parse_positive(name: &'static str, value: String) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        GatewayConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = match config_from(&[]) {
            Ok(c) => c,
            Err(e) => panic!("default config failed: {e}"),
        };
        assert_eq!(config.listen_addr, "127.0.0.1:5000");
        assert_eq!(config.backend, BackendKind::Process);
        assert_eq!(config.limits.memory_limit_bytes, 128 * 1024 * 1024);
        assert_eq!(config.limits.timeout, Duration::from_secs(2));
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn variables_override_defaults() {
        let config = match config_from(&[
            ("MATHHUB_LISTEN_ADDR", "0.0.0.0:8080"),
            ("MATHHUB_SANDBOX_BACKEND", "Inline"),
            ("MATHHUB_SANDBOX_MEMORY_MIB", "64"),
            ("MATHHUB_SANDBOX_TIMEOUT_MS", "750"),
            ("MATHHUB_SEED_FILE", "/srv/quests.json"),
        ]) {
            Ok(c) => c,
            Err(e) => panic!("config failed: {e}"),
        };
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.backend, BackendKind::Inline);
        assert_eq!(config.limits.memory_limit_bytes, 64 * 1024 * 1024);
        assert_eq!(config.limits.timeout, Duration::from_millis(750));
        assert_eq!(config.seed_file, Some(PathBuf::from("/srv/quests.json")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("MATHHUB_SANDBOX_BACKEND", "vm")]),
            Err(ConfigError::InvalidValue { name: "MATHHUB_SANDBOX_BACKEND", .. })
        ));
        assert!(matches!(
            config_from(&[("MATHHUB_SANDBOX_TIMEOUT_MS", "0")]),
            Err(ConfigError::InvalidValue { name: "MATHHUB_SANDBOX_TIMEOUT_MS", .. })
        ));
        assert!(matches!(
            config_from(&[("MATHHUB_SANDBOX_MEMORY_MIB", "lots")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn inline_evaluator_builds_without_worker() {
        let config = GatewayConfig { backend: BackendKind::Inline, ..GatewayConfig::default() };
        match config.evaluator() {
            Ok(evaluator) => assert_eq!(evaluator.backend().name(), "inline"),
            Err(e) => panic!("inline evaluator failed: {e}"),
        }
    }
}
