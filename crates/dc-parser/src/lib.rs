#![forbid(unsafe_code)]

mod convert;
mod extract;
mod recover;
mod report;
mod sanitize;
mod scan;
mod validate;

use dc_core::{
    Diagnostic, DiagnosticCounts, DiagnosticStage, IdGenerator, ParserConfig, RenderElement,
    TimestampIdGenerator, json_type_name,
};
use serde::Serialize;
use serde_json::{Value, json};

pub use convert::convert_element;
pub use extract::{BracketMatch, ExtractError, Extracted, extract_array_payload};
pub use recover::{Recovered, RecoveryError, RecoveryStrategy, recover_array};
pub use sanitize::{Adjustment, Sanitized, sanitize_element};
pub use validate::validate_element;

use report::Reporter;
use scan::excerpt;

const EXCERPT_CHARS: usize = 200;

/// Outcome of one parse, with everything needed to explain it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanvasParseResult {
    pub elements: Vec<RenderElement>,
    pub diagnostics: Vec<Diagnostic>,
    /// Strategy that produced the parsed array, if parsing got that far.
    pub strategy: Option<RecoveryStrategy>,
    /// How the array end was located, if extraction succeeded.
    pub bracket_match: Option<BracketMatch>,
    /// Items in the parsed array.
    pub source_count: usize,
    /// Items rejected by validation or conversion.
    pub dropped_count: usize,
}

impl CanvasParseResult {
    fn empty(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            elements: Vec::new(),
            diagnostics,
            strategy: None,
            bracket_match: None,
            source_count: 0,
            dropped_count: 0,
        }
    }

    #[must_use]
    pub fn counts(&self) -> DiagnosticCounts {
        DiagnosticCounts::from_diagnostics(&self.diagnostics)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Turns raw model responses into canvas primitives.
///
/// Holds the configuration and the id source for a session. Ids stay unique
/// across calls on the same parser.
pub struct CanvasParser {
    config: ParserConfig,
    ids: Box<dyn IdGenerator>,
}

impl Default for CanvasParser {
    fn default() -> Self {
        Self::new(ParserConfig::from_env())
    }
}

impl CanvasParser {
    /// Parser with wall-clock ids. Reads the system clock once.
    #[must_use]
    pub fn new(config: ParserConfig) -> Self {
        Self::with_ids(config, TimestampIdGenerator::new())
    }

    /// Parser with a caller-supplied id source. Use this where the system
    /// clock is unavailable.
    #[must_use]
    pub fn with_ids(config: ParserConfig, ids: impl IdGenerator + 'static) -> Self {
        Self {
            config,
            ids: Box::new(ids),
        }
    }

    /// Replace the id source, e.g. with a deterministic one.
    #[must_use]
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Run the full pipeline. Never fails; problems are reported as
    /// diagnostics and the affected input is dropped.
    pub fn parse(&mut self, input: &str) -> CanvasParseResult {
        let mut reporter = Reporter::new(self.config.debug);

        let extracted = match extract_array_payload(input) {
            Ok(extracted) => extracted,
            Err(ExtractError::Empty) => {
                reporter.push(Diagnostic::info(
                    DiagnosticStage::Extraction,
                    "response is empty; nothing to draw",
                ));
                return CanvasParseResult::empty(reporter.finish());
            }
            Err(error) => {
                reporter.push(
                    Diagnostic::error(DiagnosticStage::Extraction, error.to_string())
                        .with_excerpt(excerpt(input, EXCERPT_CHARS)),
                );
                return CanvasParseResult::empty(reporter.finish());
            }
        };

        if extracted.decoded {
            reporter.push(Diagnostic::info(
                DiagnosticStage::Extraction,
                "response was double-encoded; decoded before extraction",
            ));
        }
        match extracted.matched {
            BracketMatch::Structural => {}
            BracketMatch::LastBracket => reporter.push(Diagnostic::warning(
                DiagnosticStage::Extraction,
                "brackets are unbalanced; using the last `]`",
            )),
            BracketMatch::Unterminated => reporter.push(Diagnostic::warning(
                DiagnosticStage::Extraction,
                "array is not terminated; response looks truncated",
            )),
        }

        let recovered = match recover_array(&extracted.payload) {
            Ok(recovered) => recovered,
            Err(error) => {
                reporter.push(
                    Diagnostic::error(DiagnosticStage::Recovery, error.to_string())
                        .with_excerpt(error.excerpt),
                );
                let mut result = CanvasParseResult::empty(reporter.finish());
                result.bracket_match = Some(extracted.matched);
                return result;
            }
        };
        reporter.push(Diagnostic::info(
            DiagnosticStage::Recovery,
            format!("parsed with strategy `{}`", recovered.strategy.as_str()),
        ));

        let mut result = CanvasParseResult::empty(Vec::new());
        result.strategy = Some(recovered.strategy);
        result.bracket_match = Some(extracted.matched);

        let items = match recovered.value {
            Value::Array(items) if !items.is_empty() => items,
            Value::Array(_) => {
                reporter.push(Diagnostic::warning(
                    DiagnosticStage::Structure,
                    "parsed array is empty; nothing to draw",
                ));
                result.diagnostics = reporter.finish();
                return result;
            }
            other => {
                reporter.push(Diagnostic::error(
                    DiagnosticStage::Structure,
                    format!("expected an array of elements, found {}", json_type_name(&other)),
                ));
                result.diagnostics = reporter.finish();
                return result;
            }
        };

        result.source_count = items.len();
        for (index, item) in items.iter().enumerate() {
            match self.convert_item(index, item, &mut reporter) {
                Some(primitives) => result.elements.extend(primitives),
                None => result.dropped_count += 1,
            }
        }

        result.diagnostics = reporter.finish();
        result
    }

    fn convert_item(
        &mut self,
        index: usize,
        item: &Value,
        reporter: &mut Reporter,
    ) -> Option<Vec<RenderElement>> {
        let validated = match validate_element(item) {
            Ok(validated) => validated,
            Err(error) => {
                reporter.push(
                    Diagnostic::warning(DiagnosticStage::Validation, error.to_string())
                        .with_element(index),
                );
                return None;
            }
        };

        if !validated.kind.is_known() {
            reporter.push(
                Diagnostic::warning(
                    DiagnosticStage::Validation,
                    format!(
                        "unknown element type `{}`; drawn as a rectangle",
                        validated.kind.as_str()
                    ),
                )
                .with_element(index),
            );
        }

        let sanitized = sanitize_element(validated, self.config.text_limit);
        for adjustment in &sanitized.adjustments {
            reporter.push(
                Diagnostic::info(DiagnosticStage::Sanitization, adjustment.to_string())
                    .with_element(index),
            );
        }

        match convert_element(&sanitized.element, &self.config.convert, self.ids.as_mut()) {
            Ok(primitives) => Some(primitives),
            Err(error) => {
                reporter.push(
                    Diagnostic::error(DiagnosticStage::Conversion, error.to_string())
                        .with_element(index),
                );
                None
            }
        }
    }
}

/// Parse a model response with default settings.
///
/// The debug flag comes from `CANVAS_DEBUG`; ids are timestamp based.
#[must_use]
pub fn parse_canvas_response(input: &str) -> Vec<RenderElement> {
    CanvasParser::default().parse(input).elements
}

/// Compact JSON summary of a parse, for logs and tooling.
#[must_use]
pub fn parse_evidence_json(parsed: &CanvasParseResult) -> String {
    let counts = parsed.counts();
    json!({
        "element_count": parsed.elements.len(),
        "source_count": parsed.source_count,
        "dropped_count": parsed.dropped_count,
        "strategy": parsed.strategy.map(RecoveryStrategy::as_str),
        "bracket_match": parsed.bracket_match.map(BracketMatch::as_str),
        "info_count": counts.infos,
        "warning_count": counts.warnings,
        "error_count": counts.errors,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use dc_core::{
        DebugConfig, DiagnosticStage, ParserConfig, RenderElement, RenderKind,
        SequentialIdGenerator,
    };
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::{
        BracketMatch, CanvasParseResult, CanvasParser, RecoveryStrategy, extract_array_payload,
        parse_canvas_response, parse_evidence_json,
    };

    const PROMPT_EXAMPLE: &str = r##"[
  {"type": "text", "x": 100, "y": 40, "text": "User Login Flow", "fontSize": 28},
  {"type": "rectangle", "x": 100, "y": 120, "width": 200, "height": 80, "text": "Enter credentials", "backgroundColor": "#e3f2fd"},
  {"type": "arrow", "x": 200, "y": 200, "points": [[0, 0], [0, 100]]}
]"##;

    fn parser() -> CanvasParser {
        CanvasParser::new(ParserConfig {
            debug: DebugConfig::disabled(),
            ..ParserConfig::default()
        })
        .with_id_generator(SequentialIdGenerator::new("el"))
    }

    fn parse(input: &str) -> CanvasParseResult {
        parser().parse(input)
    }

    fn summary(elements: &[RenderElement]) -> Vec<(&'static str, f64, f64)> {
        elements
            .iter()
            .map(|element| (element.type_name(), element.x, element.y))
            .collect()
    }

    #[test]
    fn prompt_example_yields_four_primitives() {
        let result = parse(PROMPT_EXAMPLE);
        assert_eq!(result.strategy, Some(RecoveryStrategy::Direct));
        assert_eq!(result.source_count, 3);
        assert_eq!(result.dropped_count, 0);
        let types: Vec<_> = result.elements.iter().map(RenderElement::type_name).collect();
        assert_eq!(types, ["text", "rectangle", "text", "arrow"]);

        let container = &result.elements[1];
        let label = &result.elements[2];
        assert_eq!(
            label.text_props().and_then(|props| props.container_id.as_deref()),
            Some(container.id.as_str())
        );
        assert_eq!(container.background_color, "#e3f2fd");
        assert!(!result.has_errors());
    }

    #[test]
    fn fenced_response_with_trailing_comma_matches_unwrapped() {
        let wrapped = "Here you go:\n```json\n[{\"type\":\"ellipse\",\"x\":1,\"y\":2,\"text\":\"A\"},]\n```\nDone.";
        let plain = r#"[{"type":"ellipse","x":1,"y":2,"text":"A"}]"#;
        let wrapped_result = parse(wrapped);
        assert!(matches!(
            wrapped_result.strategy,
            Some(RecoveryStrategy::Direct | RecoveryStrategy::CompactWhitespace)
        ));
        assert_eq!(wrapped_result.elements, parse(plain).elements);
    }

    #[test]
    fn truncated_response_keeps_complete_objects() {
        let input = r#"[{"type":"rectangle","x":10,"y":10},{"type":"text","x":5,"y":5,"text":"ok"},{"type":"ellipse","x":"#;
        let result = parse(input);
        assert_eq!(result.bracket_match, Some(BracketMatch::Unterminated));
        assert_eq!(result.strategy, Some(RecoveryStrategy::RepairTruncation));
        assert_eq!(
            summary(&result.elements),
            [("rectangle", 10.0, 10.0), ("text", 5.0, 5.0)]
        );
    }

    #[test]
    fn truncation_after_nested_points_keeps_complete_objects() {
        let input = r#"[{"type":"arrow","x":0,"y":0,"points":[[0,0],[1,0]]},{"type":"text","x":1,"y":1,"text":"ok"},{"type":"rect"#;
        let result = parse(input);
        assert_eq!(result.bracket_match, Some(BracketMatch::Unterminated));
        assert_eq!(result.strategy, Some(RecoveryStrategy::RepairTruncation));
        assert_eq!(summary(&result.elements), [("arrow", 0.0, 0.0), ("text", 1.0, 1.0)]);
    }

    #[test]
    fn default_entry_point_ids_differ_between_calls() {
        let first = parse_canvas_response(r#"[{"type":"ellipse"}]"#);
        let second = parse_canvas_response(r#"[{"type":"ellipse"}]"#);
        assert_ne!(first[0].id, second[0].id);
    }

    #[test]
    fn short_arrow_is_given_the_default_segment() {
        let elements = parse(r#"[{"type":"arrow","x":0,"y":0,"points":[[0,0]]}]"#).elements;
        let props = elements[0].arrow_props().expect("arrow");
        assert_eq!(props.points, vec![[0.0, 0.0], [100.0, 0.0]]);
    }

    #[test]
    fn unsafe_colors_are_removed_and_safe_ones_kept() {
        let elements = parse(
            r##"[{"type":"rectangle","backgroundColor":"javascript:alert(1)"},
                {"type":"rectangle","backgroundColor":"#e3f2fd"}]"##,
        )
        .elements;
        assert_eq!(elements[0].background_color, "transparent");
        assert_eq!(elements[1].background_color, "#e3f2fd");
        let serialized = serde_json::to_string(&elements).expect("serialize");
        assert!(!serialized.contains("javascript"));
    }

    #[test]
    fn unknown_type_renders_as_rectangle_with_a_warning() {
        let result = parse(r#"[{"type":"hexagon","x":0,"y":0}]"#);
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements[0].kind, RenderKind::Rectangle);
        assert_eq!(result.counts().warnings, 1);
    }

    #[test]
    fn empty_input_is_not_an_error() {
        for input in ["", "   \n"] {
            let result = parse(input);
            assert!(result.elements.is_empty());
            assert!(!result.has_errors());
            assert_eq!(result.counts().infos, 1);
        }
    }

    #[test]
    fn garbage_input_logs_an_extraction_error() {
        let result = parse("hello world");
        assert!(result.elements.is_empty());
        assert_eq!(result.counts().errors, 1);
        assert_eq!(result.diagnostics[0].stage, DiagnosticStage::Extraction);
        assert_eq!(result.diagnostics[0].excerpt.as_deref(), Some("hello world"));
    }

    #[test]
    fn unparseable_array_logs_a_recovery_error_with_excerpt() {
        let result = parse("[not json at all]");
        assert!(result.elements.is_empty());
        let error = result
            .diagnostics
            .iter()
            .find(|diag| diag.is_error())
            .expect("recovery error");
        assert_eq!(error.stage, DiagnosticStage::Recovery);
        assert_eq!(error.excerpt.as_deref(), Some("[not json at all]"));
    }

    #[test]
    fn structural_failures_produce_nothing() {
        let empty = parse("[]");
        assert!(empty.elements.is_empty());
        assert!(!empty.has_errors());
        assert_eq!(empty.counts().warnings, 1);

        let nested = parse("[[]]");
        assert!(nested.elements.is_empty());
        assert_eq!(nested.dropped_count, 1);
    }

    #[test]
    fn invalid_items_are_dropped_without_affecting_siblings() {
        let result = parse(
            r#"[{"type":"rectangle","x":"ten"},null,{"type":"text","x":1,"y":2,"text":"kept"},{"no":"type"}]"#,
        );
        assert_eq!(result.source_count, 4);
        assert_eq!(result.dropped_count, 3);
        assert_eq!(summary(&result.elements), [("text", 1.0, 2.0)]);
        let indices: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|diag| diag.stage == DiagnosticStage::Validation)
            .filter_map(|diag| diag.element_index)
            .collect();
        assert_eq!(indices, [0, 1, 3]);
    }

    #[test]
    fn overflowing_arrow_is_dropped_with_a_conversion_error() {
        let result = parse(
            r#"[{"type":"arrow","points":[[-1e308,0],[1e308,0]]},{"type":"diamond","x":0,"y":0}]"#,
        );
        assert_eq!(result.dropped_count, 1);
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements[0].type_name(), "diamond");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|diag| diag.is_error() && diag.stage == DiagnosticStage::Conversion)
        );
    }

    #[test]
    fn ids_stay_unique_across_calls() {
        let mut parser = parser();
        let first = parser.parse(r#"[{"type":"rectangle","text":"a"}]"#);
        let second = parser.parse(r#"[{"type":"rectangle","text":"b"}]"#);
        assert_eq!(first.elements[0].id, "el-0");
        assert_eq!(first.elements[1].id, "el-0-text");
        assert_eq!(second.elements[0].id, "el-1");
    }

    #[test]
    fn default_entry_point_uses_timestamp_ids() {
        let elements = parse_canvas_response(r#"[{"type":"ellipse"}]"#);
        assert_eq!(elements.len(), 1);
        assert!(elements[0].id.starts_with("gen-"));
    }

    #[test]
    fn evidence_json_summarizes_the_parse() {
        let result = parse(PROMPT_EXAMPLE);
        let evidence: Value =
            serde_json::from_str(&parse_evidence_json(&result)).expect("evidence json");
        assert_eq!(evidence["element_count"], json!(4));
        assert_eq!(evidence["source_count"], json!(3));
        assert_eq!(evidence["strategy"], json!("direct"));
        assert_eq!(evidence["bracket_match"], json!("structural"));
        assert_eq!(evidence["error_count"], json!(0));
    }

    fn element_strategy() -> impl Strategy<Value = (Value, usize)> {
        let kind = prop_oneof![
            Just("rectangle"),
            Just("ellipse"),
            Just("diamond"),
            Just("arrow"),
            Just("text"),
        ];
        (kind, 0_i32..1000, 0_i32..1000, proptest::option::of("[a-zA-Z ]{1,16}")).prop_map(
            |(kind, x, y, text)| {
                let mut element = json!({ "type": kind, "x": x, "y": y });
                if let Some(text) = &text {
                    element["text"] = json!(text);
                }
                let is_shape = matches!(kind, "rectangle" | "ellipse" | "diamond");
                let expected = if is_shape && text.is_some() { 2 } else { 1 };
                (element, expected)
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_parse_is_total(input in ".{0,256}") {
            let result = parse(&input);
            prop_assert!(result.dropped_count <= result.source_count);
            prop_assert!(result.elements.iter().all(RenderElement::has_finite_geometry));
        }

        #[test]
        fn prop_well_formed_arrays_keep_every_element(
            items in proptest::collection::vec(element_strategy(), 1..12)
        ) {
            let expected: usize = items.iter().map(|(_, count)| count).sum();
            let array = Value::Array(items.into_iter().map(|(item, _)| item).collect());
            let result = parse(&array.to_string());

            prop_assert_eq!(result.elements.len(), expected);
            prop_assert_eq!(result.dropped_count, 0);
            for element in &result.elements {
                if let Some(container_id) = element.text_props().and_then(|props| props.container_id.as_ref()) {
                    let container = result.elements.iter().find(|other| &other.id == container_id);
                    let bound = container.and_then(|other| other.bound_elements.as_ref());
                    prop_assert!(bound.is_some_and(|bound| bound.iter().any(|entry| entry.id == element.id)));
                }
            }
        }

        #[test]
        fn prop_extraction_is_idempotent(
            items in proptest::collection::vec(element_strategy(), 0..6),
            prefix in "[a-zA-Z .:]{0,24}",
            suffix in "[a-zA-Z .]{0,24}",
            fenced in any::<bool>(),
        ) {
            let array = Value::Array(items.into_iter().map(|(item, _)| item).collect());
            let body = format!("{prefix}\n{array}\n{suffix}");
            let input = if fenced { format!("```json\n{body}\n```") } else { body };

            let once = extract_array_payload(&input).expect("array present");
            let twice = extract_array_payload(&once.payload).expect("payload re-extracts");
            prop_assert_eq!(once.payload, twice.payload);
        }
    }
}
