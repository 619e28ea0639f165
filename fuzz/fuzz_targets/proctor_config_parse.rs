//! Fuzz harness for `ProctorConfig::from_toml` and `ProctorConfig::validate`.
//!
//! Configuration files are operator-supplied. Parsing and validation must
//! return `Ok` or `Err` for any input, never panic, and a configuration that
//! validates must survive a serialize/parse cycle unchanged.

#![no_main]
use libfuzzer_sys::fuzz_target;
use proctor_core::ProctorConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = ProctorConfig::from_toml(s) else {
        return;
    };
    if config.validate().is_err() {
        return;
    }

    let rendered = config.to_toml().expect("valid config must serialize");
    let reparsed = ProctorConfig::from_toml(&rendered).expect("rendered config must parse");
    assert_eq!(config, reparsed);
});
