#![no_main]

use jsbind::{EngineConfig, ScriptEngine};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Large inputs mostly measure the parser
    if data.len() > 10_000 {
        return;
    }

    // There is no execution budget, so skip anything that can loop forever
    const LOOPS: [&[u8]; 3] = [b"while", b"for", b"do"];
    if LOOPS
        .iter()
        .any(|keyword| data.windows(keyword.len()).any(|window| window == *keyword))
    {
        return;
    }

    // Keep the script heap small so runaway allocations fail fast
    let config = EngineConfig::default()
        .with_memory_limit(16 * 1024 * 1024)
        .with_max_stack_size(256 * 1024);
    let mut engine = ScriptEngine::new(config).expect("engine init");
    engine.start().expect("engine start");

    // Errors are expected; a failed script must leave nothing pending
    if let Ok(Some(value)) = engine.execute_script_buffer(data, Some("fuzz.js")) {
        engine.release_value(&value);
    }
    assert!(!engine.has_pending_exception());

    engine.collect_garbage();
    engine.cleanup();
});
