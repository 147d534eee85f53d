//! Owned engine slot

use super::fake::FakeRuntime;
use super::test_config;
use jsbind::{BridgeError, EngineConfig, EngineHost, ScriptEngine, Value};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_instance_created_lazily_once() {
    let created = Rc::new(Cell::new(0));
    let counter = created.clone();
    let mut host = EngineHost::with_factory(move || {
        counter.set(counter.get() + 1);
        ScriptEngine::with_runtime(FakeRuntime::new(), EngineConfig::default())
    });

    assert!(!host.has_instance());
    assert!(host.instance().is_none());
    host.get_instance().unwrap();
    host.get_instance().unwrap();
    assert_eq!(created.get(), 1);
    assert!(host.instance().unwrap().is_valid());
}

#[test]
fn test_failed_init_leaves_slot_empty() {
    let attempts = Rc::new(Cell::new(0));
    let counter = attempts.clone();
    let mut host = EngineHost::with_factory(move || {
        counter.set(counter.get() + 1);
        if counter.get() == 1 {
            return Err(BridgeError::RuntimeInit("out of memory".into()));
        }
        ScriptEngine::with_runtime(FakeRuntime::new(), EngineConfig::default())
    });

    assert!(matches!(
        host.get_instance(),
        Err(BridgeError::RuntimeInit(_))
    ));
    assert!(!host.has_instance());

    host.get_instance().unwrap();
    assert!(host.has_instance());
    assert_eq!(attempts.get(), 2);
}

#[test]
fn test_destroy_cleans_up_and_empties_slot() {
    let runtime = FakeRuntime::new();
    let state = runtime.state();
    let mut slot = Some(runtime);
    let mut host = EngineHost::with_factory(move || match slot.take() {
        Some(runtime) => ScriptEngine::with_runtime(runtime, EngineConfig::default()),
        None => Err(BridgeError::NotInitialized),
    });

    host.get_instance().unwrap();
    host.destroy_instance();

    assert!(!host.has_instance());
    assert!(state.borrow().shut_down);
    host.destroy_instance();
}

#[test]
fn test_quickjs_host() {
    let mut host = EngineHost::new(test_config());
    let engine = host.get_instance().unwrap();
    engine.start().unwrap();
    assert_eq!(
        engine.execute_script("var leftover = 6 * 7; leftover").unwrap(),
        Some(Value::Number(42.0))
    );
    host.destroy_instance();

    // A new engine starts from a clean global object.
    let engine = host.get_instance().unwrap();
    assert_eq!(
        engine.execute_script("typeof leftover").unwrap(),
        Some(Value::String("undefined".into()))
    );
}
