#![no_main]

use dc_core::{DebugConfig, ParserConfig, SequentialIdGenerator};
use dc_parser::CanvasParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let config = ParserConfig {
        debug: DebugConfig::disabled(),
        ..ParserConfig::default()
    };
    let parsed = CanvasParser::with_ids(config, SequentialIdGenerator::new("fuzz")).parse(input);

    assert!(parsed.dropped_count <= parsed.source_count);
    for element in &parsed.elements {
        assert!(element.has_finite_geometry());
    }
    let _ = serde_json::to_string(&parsed.elements).expect("elements serialize");
});
