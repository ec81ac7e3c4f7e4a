//! Deep copies between engine values and [`SandboxValue`].
//!
//! Nothing but plain data crosses in either direction. Results are copied
//! out node by node, so no engine object, prototype or closure is ever
//! reachable from the host.

use boa_engine::object::builtins::JsArray;
use boa_engine::{js_string, Context, JsObject, JsResult, JsString, JsValue};
use indexmap::IndexMap;

use mathhub_core::SandboxValue;

use crate::config::EngineLimits;
use crate::engine::script_error;
use crate::error::SandboxError;

/// Build a fresh engine value from a host value.
///
/// # Errors
/// Propagates engine errors raised while allocating arrays or objects.
pub fn to_js(value: &SandboxValue, context: &mut Context) -> JsResult<JsValue> {
    Ok(match value {
        SandboxValue::Null => JsValue::null(),
        SandboxValue::Bool(b) => JsValue::from(*b),
        SandboxValue::Number(n) => JsValue::Rational(*n),
        SandboxValue::String(s) => JsValue::from(JsString::from(s.as_str())),
        SandboxValue::Array(items) => {
            let elements = items.iter().map(|item| to_js(item, context)).collect::<JsResult<Vec<_>>>()?;
            JsArray::from_iter(elements, context).into()
        }
        SandboxValue::Object(map) => {
            let object = JsObject::with_object_proto(context.intrinsics());
            for (key, item) in map {
                let item = to_js(item, context)?;
                object.create_data_property_or_throw(JsString::from(key.as_str()), item, context)?;
            }
            object.into()
        }
    })
}

/// Copy a function's return value out of the engine.
///
/// A top-level `undefined` is a user error: the function did not produce an
/// answer. Nested `undefined` follows `JSON.stringify`: array slots become
/// `null` and object properties are dropped.
///
/// # Errors
/// Returns [`SandboxError::UnsupportedValueType`] for functions, symbols,
/// big integers, cycles, or results exceeding the depth or node limits.
/// Returns [`SandboxError::UserCode`] if a getter throws while copying.
pub fn from_js(
    value: &JsValue,
    context: &mut Context,
    object_keys: &JsObject,
    limits: &EngineLimits,
) -> Result<SandboxValue, SandboxError> {
    let mut copier = Copier { context, object_keys, limits, nodes: 0, ancestors: Vec::new() };
    copier
        .copy(value)?
        .ok_or_else(|| SandboxError::user_code("function returned undefined"))
}

struct Copier<'a> {
    context: &'a mut Context,
    object_keys: &'a JsObject,
    limits: &'a EngineLimits,
    nodes: usize,
    ancestors: Vec<JsObject>,
}

impl Copier<'_> {
    fn copy(&mut self, value: &JsValue) -> Result<Option<SandboxValue>, SandboxError> {
        let copied = match value {
            JsValue::Undefined => return Ok(None),
            JsValue::Null => SandboxValue::Null,
            JsValue::Boolean(b) => SandboxValue::Bool(*b),
            JsValue::Integer(i) => SandboxValue::Number(f64::from(*i)),
            JsValue::Rational(n) => SandboxValue::Number(*n),
            JsValue::String(s) => SandboxValue::String(s.to_std_string_escaped()),
            JsValue::BigInt(_) => return Err(SandboxError::unsupported("bigint")),
            JsValue::Symbol(_) => return Err(SandboxError::unsupported("symbol")),
            JsValue::Object(object) => self.copy_object(object)?,
        };
        Ok(Some(copied))
    }

    fn copy_object(&mut self, object: &JsObject) -> Result<SandboxValue, SandboxError> {
        if object.is_callable() {
            return Err(SandboxError::unsupported("function"));
        }
        if self.ancestors.iter().any(|seen| JsObject::equals(seen, object)) {
            return Err(SandboxError::unsupported("cyclic structure"));
        }
        if self.ancestors.len() >= self.limits.max_marshal_depth {
            return Err(SandboxError::unsupported(format!(
                "nesting deeper than {} levels",
                self.limits.max_marshal_depth
            )));
        }

        self.ancestors.push(object.clone());
        let copied = if object.is_array() { self.copy_array(object) } else { self.copy_plain(object) };
        self.ancestors.pop();
        copied
    }

    fn copy_array(&mut self, array: &JsObject) -> Result<SandboxValue, SandboxError> {
        let length = array
            .get(js_string!("length"), self.context)
            .and_then(|len| len.to_length(self.context))
            .map_err(script_error)?;
        let mut items = Vec::new();
        for index in 0..length {
            self.count_node()?;
            let index = u32::try_from(index)
                .map_err(|_| SandboxError::unsupported("array longer than 2^32 - 1"))?;
            let item = array.get(index, self.context).map_err(script_error)?;
            items.push(self.copy(&item)?.unwrap_or_default());
        }
        Ok(SandboxValue::Array(items))
    }

    fn copy_plain(&mut self, object: &JsObject) -> Result<SandboxValue, SandboxError> {
        let keys = self
            .object_keys
            .call(&JsValue::undefined(), &[object.clone().into()], self.context)
            .map_err(script_error)?;
        let keys = match keys {
            JsValue::Object(keys) => keys,
            _ => return Err(SandboxError::Protocol("Object.keys did not return an array".to_owned())),
        };
        let count = keys
            .get(js_string!("length"), self.context)
            .and_then(|len| len.to_length(self.context))
            .map_err(script_error)?;

        let mut map = IndexMap::new();
        for index in 0..count {
            self.count_node()?;
            let index = u32::try_from(index)
                .map_err(|_| SandboxError::unsupported("object with more than 2^32 - 1 keys"))?;
            let key = match keys.get(index, self.context).map_err(script_error)? {
                JsValue::String(key) => key,
                _ => continue,
            };
            let item = object.get(key.clone(), self.context).map_err(script_error)?;
            if let Some(item) = self.copy(&item)? {
                map.insert(key.to_std_string_escaped(), item);
            }
        }
        Ok(SandboxValue::Object(map))
    }

    fn count_node(&mut self) -> Result<(), SandboxError> {
        self.nodes += 1;
        if self.nodes > self.limits.max_marshal_nodes {
            return Err(SandboxError::unsupported(format!(
                "result holds more than {} values",
                self.limits.max_marshal_nodes
            )));
        }
        Ok(())
    }
}
