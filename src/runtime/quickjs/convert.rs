//! Conversion between QuickJS values and bridge values, and exception
//! diagnosis.

use super::handles::HandleTable;
use crate::error::{BridgeError, ScriptException};
use crate::value::Value;
use rquickjs::{Coerced, Ctx, Exception, Object, Type};
use std::cell::RefCell;

/// Convert a script value. Objects are registered in `handles` and come back
/// as rooted handles owned by the caller.
pub(super) fn from_js<'js>(
    ctx: &Ctx<'js>,
    handles: &RefCell<HandleTable>,
    value: rquickjs::Value<'js>,
) -> Result<Value, BridgeError> {
    let converted = match value.type_of() {
        Type::Uninitialized | Type::Undefined => Value::Undefined,
        Type::Null => Value::Null,
        Type::Bool => Value::Boolean(value.as_bool().unwrap_or_default()),
        Type::Int | Type::Float => Value::Number(value.as_number().unwrap_or(f64::NAN)),
        Type::String => Value::String(value.get::<String>()?),
        Type::Symbol => {
            let description = value
                .as_symbol()
                .and_then(|symbol| symbol.description().ok())
                .and_then(|desc| desc.get::<Option<String>>().ok().flatten())
                .unwrap_or_default();
            Value::String(format!("Symbol({})", description))
        }
        Type::BigInt => Value::String(value.get::<Coerced<String>>()?.0),
        _ => match value.into_object() {
            Some(object) => Value::Object(handles.borrow_mut().insert(ctx, object)?),
            None => Value::Undefined,
        },
    };
    Ok(converted)
}

pub(super) fn to_js<'js>(
    ctx: &Ctx<'js>,
    handles: &RefCell<HandleTable>,
    value: &Value,
) -> Result<rquickjs::Value<'js>, BridgeError> {
    let converted = match value {
        Value::Undefined => rquickjs::Value::new_undefined(ctx.clone()),
        Value::Null => rquickjs::Value::new_null(ctx.clone()),
        Value::Boolean(b) => rquickjs::Value::new_bool(ctx.clone(), *b),
        Value::Number(n) => rquickjs::Value::new_number(ctx.clone(), *n),
        Value::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        Value::Object(handle) => handles.borrow().resolve_live(ctx, *handle)?.into_value(),
    };
    Ok(converted)
}

/// Describe a thrown value. Error objects yield `Name: message` and the top
/// frame location; anything else is stringified without a location.
pub(super) fn diagnose<'js>(ctx: &Ctx<'js>, thrown: &rquickjs::Value<'js>) -> ScriptException {
    let error = thrown
        .as_object()
        .cloned()
        .and_then(Exception::from_object);
    match error {
        Some(error) => diagnose_error(&error),
        None => ScriptException::new(stringify(ctx, thrown), None, 0),
    }
}

fn diagnose_error(error: &Exception<'_>) -> ScriptException {
    let object: &Object = error.as_object();
    let message = error.message().unwrap_or_default();
    let name = object
        .get::<_, Option<String>>("name")
        .ok()
        .flatten()
        .filter(|name| !name.is_empty());
    let message = match name {
        Some(name) if message.is_empty() => name,
        Some(name) => format!("{}: {}", name, message),
        None => message,
    };

    // Some errors carry their origin directly, the rest only in the stack.
    let file = object.get::<_, Option<String>>("fileName").ok().flatten();
    let line = object.get::<_, Option<u32>>("lineNumber").ok().flatten();
    if let (Some(file), Some(line)) = (file, line) {
        return ScriptException::new(message, Some(&file), line);
    }
    match error.stack().as_deref().and_then(top_frame_location) {
        Some((file, line)) => ScriptException::new(message, Some(&file), line),
        None => ScriptException::new(message, None, 0),
    }
}

fn stringify<'js>(ctx: &Ctx<'js>, value: &rquickjs::Value<'js>) -> String {
    match value.get::<Coerced<String>>() {
        Ok(text) => text.0,
        Err(_) => {
            // toString itself threw; drop that exception too
            let _ = ctx.catch();
            format!("[{}]", value.type_name())
        }
    }
}

/// File and line of the first frame of a stack trace that has a source
/// location. Frames look like `at name (file:line:col)` or `at file:line:col`;
/// only the outer parentheses are stripped, so file names may contain them.
pub(crate) fn top_frame_location(stack: &str) -> Option<(String, u32)> {
    stack.lines().find_map(|frame| {
        let frame = frame.trim().strip_prefix("at ")?;
        let location = match frame.split_once(" (") {
            Some((_name, rest)) if rest.ends_with(')') => rest.get(..rest.len() - 1)?,
            _ => frame,
        };
        let mut parts = location.rsplitn(3, ':');
        let last = parts.next()?;
        let middle = parts.next()?;
        match parts.next() {
            Some(file) => {
                let line = middle.parse::<u32>().ok()?;
                last.parse::<u32>().ok()?;
                Some((file.to_string(), line))
            }
            None => {
                let line = last.parse::<u32>().ok()?;
                Some((middle.to_string(), line))
            }
        }
    })
}
