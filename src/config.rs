//! Engine configuration

use crate::error::{BridgeError, NO_FILENAME};
use serde::Deserialize;

/// Collection threshold used when nothing else is configured, in bytes
pub const DEFAULT_GC_THRESHOLD: usize = 256 * 1024;

/// Native stack quota handed to the runtime, in bytes
pub const DEFAULT_MAX_STACK_SIZE: usize = 5_000_000;

/// Environment variable overriding [`EngineConfig::gc_threshold`]
pub const GC_THRESHOLD_ENV: &str = "JSB_GC_THRESHOLD";

/// Environment variable overriding [`EngineConfig::memory_limit`]
pub const MEMORY_LIMIT_ENV: &str = "JSB_MEMORY_LIMIT";

/// Runtime settings applied when a [`ScriptEngine`](crate::ScriptEngine) is created.
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes:
///
/// ```
/// use jsbind::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "gc_threshold": 1024 }"#).unwrap();
/// assert_eq!(config.gc_threshold, 1024);
/// assert_eq!(config.default_file_name, "(no filename)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Heap limit in bytes, 0 for unlimited
    pub memory_limit: usize,
    /// Allocation volume that triggers an automatic collection
    pub gc_threshold: usize,
    pub max_stack_size: usize,
    /// File name used when a script is executed without one
    pub default_file_name: String,
    /// Evaluate scripts in strict mode
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            memory_limit: 0,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            default_file_name: NO_FILENAME.to_string(),
            strict: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Default configuration with `JSB_GC_THRESHOLD` and `JSB_MEMORY_LIMIT`
    /// applied when they are set and parse as integers.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<usize>().ok());
        if let Some(threshold) = parse(GC_THRESHOLD_ENV) {
            self.gc_threshold = threshold;
        }
        if let Some(limit) = parse(MEMORY_LIMIT_ENV) {
            self.memory_limit = limit;
        }
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = bytes;
        self
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }

    pub fn with_default_file_name(mut self, name: impl Into<String>) -> Self {
        self.default_file_name = name.into();
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
