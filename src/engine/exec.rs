//! Script execution and exception diagnostics.

use super::ScriptEngine;
use super::gc::WeakPass;
use crate::error::{BridgeError, ScriptException};
use crate::runtime::ScriptRuntime;
use crate::value::Value;

impl<R: ScriptRuntime> ScriptEngine<R> {
    /// Compile and run a UTF-8 source buffer in the global scope.
    ///
    /// `file_name` defaults to the configured default file name (`"(no
    /// filename)"` unless changed). Returns `Ok(None)` when the script
    /// evaluates to `undefined` or `null`. An object result is a handle owned
    /// by the caller; hand it back with [`release_value`](Self::release_value).
    ///
    /// A thrown exception is logged, cleared and returned as
    /// [`BridgeError::Script`].
    pub fn execute_script_buffer(
        &mut self,
        source: &[u8],
        file_name: Option<&str>,
    ) -> Result<Option<Value>, BridgeError> {
        let source = std::str::from_utf8(source)
            .map_err(|err| BridgeError::invalid_source(format!("not valid UTF-8: {}", err)))?;
        if source.contains('\0') {
            return Err(BridgeError::invalid_source("source contains a NUL byte"));
        }
        let file_name = match file_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.config.default_file_name.clone(),
        };

        let runtime = self.runtime.as_mut().ok_or(BridgeError::NotInitialized)?;
        let mut pass = WeakPass::new(&mut self.objects, self.in_cleanup);
        let outcome = runtime.evaluate(source, &file_name, &mut pass);

        match outcome {
            Ok(value) if value.is_null_or_undefined() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(BridgeError::ExceptionPending) => {
                let exception = self.clear_exception().unwrap_or_else(|| {
                    ScriptException::new("uncaught exception", Some(&file_name), 0)
                });
                Err(BridgeError::Script(exception))
            }
            Err(err) => {
                self.clear_exception();
                Err(err)
            }
        }
    }

    /// [`execute_script_buffer`](Self::execute_script_buffer) with the default
    /// file name.
    pub fn execute_script(&mut self, source: &str) -> Result<Option<Value>, BridgeError> {
        self.execute_script_buffer(source.as_bytes(), None)
    }

    /// Take the pending exception, if any, and log it.
    ///
    /// The diagnosed exception is also returned so callers can inspect it;
    /// ignoring it is fine.
    pub fn clear_exception(&mut self) -> Option<ScriptException> {
        let runtime = self.runtime.as_mut()?;
        let exception = runtime.take_pending_exception()?;
        tracing::error!("{}", exception);
        Some(exception)
    }

    pub fn has_pending_exception(&self) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|runtime| runtime.has_pending_exception())
    }
}
