//! Fuzz target for key path parsing.
//!
//! Parsing must never panic, and anything it accepts must render
//! back to the same path.

#![no_main]

use correlation_engine::key::{Action, KeyPath, RenderMode, StorageKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(parsed) = KeyPath::parse(data) else {
        return;
    };

    let segments: Vec<&str> = parsed.address.iter().map(|s| s.as_str()).collect();
    let action = match &parsed.action {
        Some(action) => Action::Explicit(action.clone()),
        None => Action::None,
    };
    let key = match segments.as_slice() {
        [app] => StorageKey::new(app, None, None, action),
        [app, env] => StorageKey::new(app, Some(env), None, action),
        [app, env, user] => StorageKey::new(app, Some(env), Some(user), action),
        _ => panic!("parse accepted {} address segments", segments.len()),
    }
    .expect("parsed segments are valid");

    assert_eq!(key.render(RenderMode::Full).expect("explicit key renders"), data);
});
