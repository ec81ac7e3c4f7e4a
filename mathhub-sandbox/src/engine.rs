//! The script engine that runs inside a sandbox.
//!
//! Each [`ContextId`] maps to its own engine realm with its own global
//! object, so nothing one function defines is visible to another. The
//! engine has no host bindings: no module loader, filesystem, network,
//! process or timer APIs exist for user code to reach.

use std::collections::HashMap;

use boa_engine::{Context, JsError, JsNativeErrorKind, JsObject, JsResult, JsValue, Source};

use mathhub_core::SandboxValue;

use crate::config::{ContextId, EngineLimits};
use crate::error::SandboxError;
use crate::marshal;
use crate::nesting::source_nesting;
use crate::protocol::{WireValue, WorkerRequest, WorkerResponse};

/// Translate an engine error into the sandbox taxonomy.
///
/// Runtime-limit violations (loop budget, call depth) count as running out
/// of time; everything else, including syntax errors, is the user's fault.
pub(crate) fn script_error(error: JsError) -> SandboxError {
    if let Some(native) = error.as_native() {
        if matches!(native.kind, JsNativeErrorKind::RuntimeLimit) {
            return SandboxError::ExecutionTimeout { reason: native.to_string() };
        }
    }
    SandboxError::user_code(error.to_string())
}

/// One isolated global environment.
struct Realm {
    context: Context,
    /// `Object.keys` as it was before any user code ran.
    object_keys: JsObject,
}

impl Realm {
    fn new(limits: &EngineLimits) -> Result<Self, SandboxError> {
        let mut context = Context::default();
        let runtime = context.runtime_limits_mut();
        runtime.set_loop_iteration_limit(limits.loop_iteration_limit);
        runtime.set_recursion_limit(limits.recursion_limit);
        runtime.set_stack_size_limit(limits.stack_size_limit);

        let keys = context.eval(Source::from_bytes("Object.keys")).map_err(script_error)?;
        let object_keys = keys
            .as_callable()
            .cloned()
            .ok_or_else(|| SandboxError::Protocol("Object.keys is not callable".to_owned()))?;
        Ok(Self { context, object_keys })
    }

    fn call(
        &mut self,
        source: &str,
        args: &[SandboxValue],
        limits: &EngineLimits,
    ) -> Result<SandboxValue, SandboxError> {
        // The newline keeps a trailing line comment from swallowing the paren.
        let wrapped = format!("({source}\n)");
        let value = self.context.eval(Source::from_bytes(&wrapped)).map_err(script_error)?;
        let Some(function) = value.as_callable().cloned() else {
            return Err(SandboxError::user_code(format!(
                "source evaluated to {} instead of a function",
                describe(&value)
            )));
        };

        let js_args = args
            .iter()
            .map(|arg| marshal::to_js(arg, &mut self.context))
            .collect::<JsResult<Vec<_>>>()
            .map_err(script_error)?;
        let result = function
            .call(&JsValue::undefined(), &js_args, &mut self.context)
            .map_err(script_error)?;
        marshal::from_js(&result, &mut self.context, &self.object_keys, limits)
    }
}

fn describe(value: &JsValue) -> &'static str {
    match value {
        JsValue::Null => "null",
        JsValue::Undefined => "undefined",
        JsValue::Boolean(_) => "a boolean",
        JsValue::String(_) => "a string",
        JsValue::Rational(_) | JsValue::Integer(_) => "a number",
        JsValue::BigInt(_) => "a bigint",
        JsValue::Object(_) => "an object",
        JsValue::Symbol(_) => "a symbol",
    }
}

/// Owns every context of one sandbox and executes requests against them.
///
/// Not `Send`: an engine lives and dies on the thread that created it.
pub struct ScriptEngine {
    limits: EngineLimits,
    realms: HashMap<ContextId, Realm>,
}

impl ScriptEngine {
    /// Create an engine with no contexts.
    #[must_use]
    pub fn new(limits: EngineLimits) -> Self {
        Self { limits, realms: HashMap::new() }
    }

    /// Limits applied to contexts created from now on.
    #[must_use]
    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// Number of live contexts.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.realms.len()
    }

    /// Create a fresh context under `id`, replacing any previous one.
    ///
    /// # Errors
    /// Returns [`SandboxError::Protocol`] if the realm cannot be initialised.
    pub fn create_context(&mut self, id: ContextId) -> Result<(), SandboxError> {
        let realm = Realm::new(&self.limits)?;
        self.realms.insert(id, realm);
        tracing::debug!(context = %id, "context created");
        Ok(())
    }

    /// Evaluate `source` in context `id` and call the resulting function.
    ///
    /// # Errors
    /// - [`SandboxError::UnknownContext`] if `id` was never created.
    /// - [`SandboxError::UserCode`] if the source is oversized or nested
    ///   too deeply, does not parse, is not a function, throws, or returns `undefined`.
    /// - [`SandboxError::ExecutionTimeout`] if a runtime limit trips.
    /// - [`SandboxError::UnsupportedValueType`] if an argument or the result
    ///   cannot cross the boundary.
    pub fn run(
        &mut self,
        id: ContextId,
        source: &str,
        args: &[SandboxValue],
    ) -> Result<SandboxValue, SandboxError> {
        if source.len() > self.limits.max_source_bytes {
            return Err(SandboxError::user_code(format!(
                "function source is {} bytes, limit is {}",
                source.len(),
                self.limits.max_source_bytes
            )));
        }
        let nesting = source_nesting(source);
        if nesting > self.limits.max_source_nesting {
            return Err(SandboxError::user_code(format!(
                "function source nests {nesting} levels deep, limit is {}",
                self.limits.max_source_nesting
            )));
        }
        if let Some(arg) = args.iter().find(|arg| arg.depth() > self.limits.max_marshal_depth) {
            return Err(SandboxError::unsupported(format!(
                "{} argument nested {} levels deep",
                arg.type_name(),
                arg.depth()
            )));
        }
        let limits = self.limits;
        let realm = self.realms.get_mut(&id).ok_or(SandboxError::UnknownContext(id))?;
        realm.call(source, args, &limits)
    }

    /// Execute one protocol request.
    #[must_use]
    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::Configure { limits } => {
                self.limits = limits;
                WorkerResponse::Ready
            }
            WorkerRequest::CreateContext { context } => match self.create_context(context) {
                Ok(()) => WorkerResponse::Ready,
                Err(e) => WorkerResponse::from_error(e),
            },
            WorkerRequest::Run { context, source, args } => {
                let args: Vec<SandboxValue> = args.into_iter().map(SandboxValue::from).collect();
                match self.run(context, &source, &args) {
                    Ok(value) => WorkerResponse::Value { value: WireValue::from(&value) },
                    Err(e) => {
                        tracing::debug!(context = %context, kind = e.kind(), error = %e, "run failed");
                        WorkerResponse::from_error(e)
                    }
                }
            }
        }
    }
}
