//! Error types for the engine bridge

use crate::class::ClassId;
use crate::object::NativePtr;
use crate::value::ObjectHandle;
use thiserror::Error;

/// File name reported when a script is evaluated without one.
pub const NO_FILENAME: &str = "(no filename)";

/// A script exception after it has been taken off the engine and diagnosed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptException {
    pub message: String,
    pub file_name: String,
    /// 1-based line, or 0 when the engine reported no location
    pub line: u32,
}

impl ScriptException {
    pub fn new(message: impl Into<String>, file_name: Option<&str>, line: u32) -> Self {
        ScriptException {
            message: message.into(),
            file_name: file_name
                .filter(|name| !name.is_empty())
                .unwrap_or(NO_FILENAME)
                .to_string(),
            line,
        }
    }
}

impl std::fmt::Display for ScriptException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ERROR: {}, file: {}, lineno: {}",
            self.message, self.file_name, self.line
        )
    }
}

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to initialize the script runtime: {0}")]
    RuntimeInit(String),

    #[error("script engine is not initialized")]
    NotInitialized,

    #[error("register callback is already registered")]
    DuplicateRegistration,

    #[error("module initializer #{index} failed: {source}")]
    ModuleInit {
        index: usize,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("no node event listener is installed")]
    NoNodeEventListener,

    #[error("invalid script source: {0}")]
    InvalidSource(String),

    #[error("{0}")]
    Script(ScriptException),

    /// Marker returned by a runtime when evaluation left an exception pending.
    /// The bridge diagnoses it and turns it into [`BridgeError::Script`].
    #[error("a script exception is pending")]
    ExceptionPending,

    #[error("unknown class {0:?}")]
    UnknownClass(ClassId),

    #[error("unknown object handle {0:?}")]
    UnknownHandle(ObjectHandle),

    #[error("no script object wraps native object {:#x}", .0.addr())]
    UnknownNative(NativePtr),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("engine error: {0}")]
    Engine(String),
}

impl BridgeError {
    pub fn engine(message: impl Into<String>) -> Self {
        BridgeError::Engine(message.into())
    }

    pub fn invalid_source(message: impl Into<String>) -> Self {
        BridgeError::InvalidSource(message.into())
    }

    /// The diagnosed exception, if this error came from script code
    pub fn script_exception(&self) -> Option<&ScriptException> {
        match self {
            BridgeError::Script(exception) => Some(exception),
            BridgeError::ModuleInit { source, .. } => source.script_exception(),
            _ => None,
        }
    }
}

impl From<rquickjs::Error> for BridgeError {
    fn from(err: rquickjs::Error) -> Self {
        match err {
            rquickjs::Error::Exception => BridgeError::ExceptionPending,
            other => BridgeError::Engine(other.to_string()),
        }
    }
}
