#![forbid(unsafe_code)]

use std::sync::{LazyLock, RwLock};

use dc_core::{
    DebugConfig, Diagnostic, ParserConfig, RenderElement, TimestampIdGenerator, is_safe_color,
};
use dc_parser::{CanvasParseResult, CanvasParser, extract_array_payload, parse_evidence_json};
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::wasm_bindgen;

static RUNTIME_CONFIG: LazyLock<RwLock<ParserConfig>> = LazyLock::new(|| {
    RwLock::new(ParserConfig {
        debug: host_debug_config(),
        ..ParserConfig::default()
    })
});

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ParserConfigOverrides {
    debug: Option<bool>,
    text_limit: Option<usize>,
    font_size: Option<f64>,
    font_family: Option<u8>,
    label_padding: Option<f64>,
    stroke_color: Option<String>,
    background_color: Option<String>,
    stroke_width: Option<f64>,
    roughness: Option<u8>,
    char_width_ratio: Option<f64>,
    line_height: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailedOutput {
    elements: Vec<RenderElement>,
    diagnostics: Vec<Diagnostic>,
    strategy: Option<&'static str>,
    source_count: usize,
    dropped_count: usize,
}

impl From<CanvasParseResult> for DetailedOutput {
    fn from(parsed: CanvasParseResult) -> Self {
        Self {
            strategy: parsed.strategy.map(|strategy| strategy.as_str()),
            source_count: parsed.source_count,
            dropped_count: parsed.dropped_count,
            elements: parsed.elements,
            diagnostics: parsed.diagnostics,
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn now_millis() -> u128 {
    let millis = js_sys::Date::now();
    if millis.is_finite() && millis > 0.0 {
        millis as u128
    } else {
        0
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

/// Debug flag from `localStorage["CANVAS_DEBUG"]`, falling back to the
/// build profile when storage is unavailable or the value is unrecognised.
#[cfg(target_arch = "wasm32")]
fn host_debug_config() -> DebugConfig {
    let stored = web_sys::window()
        .and_then(|window| window.local_storage().ok().flatten())
        .and_then(|storage| storage.get_item(DebugConfig::ENV_VAR).ok().flatten());
    DebugConfig::from_flag(stored.as_deref()).unwrap_or(DebugConfig {
        enabled: cfg!(debug_assertions),
    })
}

#[cfg(not(target_arch = "wasm32"))]
fn host_debug_config() -> DebugConfig {
    DebugConfig::from_env()
}

fn read_runtime_config() -> ParserConfig {
    match RUNTIME_CONFIG.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write_runtime_config(config: ParserConfig) {
    match RUNTIME_CONFIG.write() {
        Ok(mut guard) => *guard = config,
        Err(poisoned) => {
            let mut guard = poisoned.into_inner();
            *guard = config;
        }
    }
}

fn js_error(message: impl Into<String>) -> JsValue {
    JsValue::from_str(&message.into())
}

fn parse_js_value_or_default<T>(value: Option<JsValue>) -> Result<T, JsValue>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match value {
        None => Ok(T::default()),
        Some(raw) if raw.is_undefined() || raw.is_null() => Ok(T::default()),
        Some(raw) => {
            #[cfg(target_arch = "wasm32")]
            {
                serde_wasm_bindgen::from_value(raw)
                    .map_err(|err| js_error(format!("invalid config: {err}")))
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                let _ = raw;
                Ok(T::default())
            }
        }
    }
}

fn to_js_value<T>(value: &T) -> Result<JsValue, JsValue>
where
    T: Serialize,
{
    #[cfg(target_arch = "wasm32")]
    {
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        value
            .serialize(&serializer)
            .map_err(|err| js_error(format!("failed to serialize response: {err}")))
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        serde_json::to_string(value)
            .map(|json| JsValue::from_str(&json))
            .map_err(|err| js_error(format!("failed to serialize response: {err}")))
    }
}

fn merge_parser_config(
    base: &ParserConfig,
    overrides: &ParserConfigOverrides,
) -> Result<ParserConfig, String> {
    let mut merged = base.clone();

    if let Some(value) = overrides.debug {
        merged.debug = DebugConfig { enabled: value };
    }
    if let Some(value) = overrides.text_limit {
        merged.text_limit = value;
    }
    if let Some(value) = overrides.font_size {
        merged.convert.font_size = positive("fontSize", value)?;
    }
    if let Some(value) = overrides.font_family {
        merged.convert.font_family = value;
    }
    if let Some(value) = overrides.label_padding {
        merged.convert.label_padding = value.max(0.0);
    }
    if let Some(value) = overrides.stroke_color.as_ref() {
        merged.convert.stroke_color = safe_color("strokeColor", value)?;
    }
    if let Some(value) = overrides.background_color.as_ref() {
        merged.convert.background_color = safe_color("backgroundColor", value)?;
    }
    if let Some(value) = overrides.stroke_width {
        merged.convert.stroke_width = positive("strokeWidth", value)?;
    }
    if let Some(value) = overrides.roughness {
        merged.convert.roughness = value;
    }
    if let Some(value) = overrides.char_width_ratio {
        merged.convert.metrics.char_width_ratio = positive("charWidthRatio", value)?;
    }
    if let Some(value) = overrides.line_height {
        merged.convert.metrics.line_height = positive("lineHeight", value)?;
    }

    Ok(merged)
}

fn positive(field: &str, value: f64) -> Result<f64, String> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("invalid {field} {value}; expected a positive number"))
    }
}

fn safe_color(field: &str, value: &str) -> Result<String, String> {
    if is_safe_color(value) {
        Ok(value.to_string())
    } else {
        Err(format!(
            "invalid {field} '{value}'; expected #rgb..#rrggbbaa, transparent, white or black"
        ))
    }
}

fn run_parse(input: &str, config: ParserConfig) -> CanvasParseResult {
    // `TimestampIdGenerator::new` reads `SystemTime`, which wasm32 lacks.
    CanvasParser::with_ids(config, TimestampIdGenerator::shared_at(now_millis())).parse(input)
}

/// Parse with the runtime configuration. Never fails.
#[must_use]
pub fn parse_canvas_response(input: &str) -> Vec<RenderElement> {
    run_parse(input, read_runtime_config()).elements
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn init(config: Option<JsValue>) -> Result<(), JsValue> {
    let overrides: ParserConfigOverrides = parse_js_value_or_default(config)?;
    let next = merge_parser_config(&read_runtime_config(), &overrides).map_err(js_error)?;
    write_runtime_config(next);
    Ok(())
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(js_name = parseCanvasResponse))]
pub fn parse_canvas_response_js(input: &str) -> Result<JsValue, JsValue> {
    to_js_value(&parse_canvas_response(input))
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(js_name = parseCanvasResponseDetailed))]
pub fn parse_canvas_response_detailed_js(
    input: &str,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let overrides: ParserConfigOverrides = parse_js_value_or_default(config)?;
    let config = merge_parser_config(&read_runtime_config(), &overrides).map_err(js_error)?;
    to_js_value(&DetailedOutput::from(run_parse(input, config)))
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(js_name = parseEvidence))]
#[must_use]
pub fn parse_evidence_js(input: &str) -> String {
    parse_evidence_json(&run_parse(input, read_runtime_config()))
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(js_name = extractArrayPayload))]
#[must_use]
pub fn extract_array_payload_js(input: &str) -> Option<String> {
    extract_array_payload(input)
        .ok()
        .map(|extracted| extracted.payload)
}
