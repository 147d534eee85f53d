//! Integration tests for the engine bridge, organized by feature
//!
//! Most suites run against the real QuickJS backend. Suites that need to
//! decide what the collector keeps use [`fake::FakeRuntime`], a scripted
//! runtime whose state stays inspectable after the engine shut it down.
//!
//! ## Aggressive Test Defaults
//!
//! QuickJS engines are created with `JSB_GC_THRESHOLD=1` so the automatic
//! collector runs on nearly every allocation. Override via environment
//! variables:
//!
//! ```bash
//! cargo test                                # Default: aggressive settings
//! JSB_GC_THRESHOLD=262144 cargo test        # Engine default, faster runs
//! ```

mod classes;
mod fake;
mod host;

use jsbind::{EngineConfig, ScriptEngine, Value};

/// Config used by every QuickJS-backed test engine.
pub fn test_config() -> EngineConfig {
    let gc_threshold = std::env::var("JSB_GC_THRESHOLD")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);
    EngineConfig::default().with_gc_threshold(gc_threshold)
}

/// Create a started QuickJS engine with aggressive defaults.
#[allow(clippy::expect_used)]
pub fn create_test_engine() -> ScriptEngine {
    let mut engine = ScriptEngine::new(test_config()).expect("engine init failed");
    engine.start().expect("engine start failed");
    engine
}

/// Evaluate `source` in a fresh engine.
#[allow(clippy::expect_used)]
pub fn eval(source: &str) -> Option<Value> {
    let mut engine = create_test_engine();
    engine.execute_script(source).expect("eval failed")
}

/// Message of the exception `source` throws, if it throws
pub fn thrown_message(source: &str) -> Option<String> {
    let mut engine = create_test_engine();
    engine
        .execute_script(source)
        .err()
        .and_then(|err| err.script_exception().map(|exc| exc.message.clone()))
}
