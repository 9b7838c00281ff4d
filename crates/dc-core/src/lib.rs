#![forbid(unsafe_code)]

mod ids;
mod text_metrics;

pub use ids::{IdGenerator, SequentialIdGenerator, TimestampIdGenerator, text_id_for};
pub use text_metrics::TextMetrics;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum number of characters kept from an element label.
pub const DEFAULT_TEXT_LIMIT: usize = 500;

/// Position used when an element arrives without usable coordinates.
pub const DEFAULT_COORDINATE: f64 = 100.0;

/// Width used when an element carries a non-positive width.
pub const DEFAULT_WIDTH: f64 = 100.0;

/// Height used when an element carries a non-positive height.
pub const DEFAULT_HEIGHT: f64 = 60.0;

/// Arrow geometry used when the supplied points are missing or too short.
pub const DEFAULT_ARROW_POINTS: [[f64; 2]; 2] = [[0.0, 0.0], [100.0, 0.0]];

const NAMED_COLORS: &[&str] = &["transparent", "white", "black"];

// =============================================================================
// Element kinds
// =============================================================================

/// The `type` tag of a diagram element as emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Diamond,
    Arrow,
    Text,
    /// Any other non-empty type name. Rendered through the rectangle path.
    Unknown(String),
}

impl ElementKind {
    /// Map a raw `type` string onto a kind. Matching is exact.
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "rectangle" => Self::Rectangle,
            "ellipse" => Self::Ellipse,
            "diamond" => Self::Diamond,
            "arrow" => Self::Arrow,
            "text" => Self::Text,
            other => Self::Unknown(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Diamond => "diamond",
            Self::Arrow => "arrow",
            Self::Text => "text",
            Self::Unknown(name) => name,
        }
    }

    /// Shape used to draw this kind, if it is drawn as a closed shape.
    #[must_use]
    pub const fn shape(&self) -> Option<ShapeKind> {
        match self {
            Self::Rectangle | Self::Unknown(_) => Some(ShapeKind::Rectangle),
            Self::Ellipse => Some(ShapeKind::Ellipse),
            Self::Diamond => Some(ShapeKind::Diamond),
            Self::Arrow | Self::Text => None,
        }
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

/// Closed shapes that can contain a bound label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Diamond,
}

// =============================================================================
// Element records
// =============================================================================

/// An element that passed structural validation.
///
/// Numeric geometry is already typed; everything the validator does not
/// check is kept as the raw JSON value until sanitization.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedElement {
    pub kind: ElementKind,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub text: Option<Value>,
    pub points: Option<Vec<Value>>,
    pub stroke_color: Option<Value>,
    pub background_color: Option<Value>,
    pub font_size: Option<Value>,
}

impl ValidatedElement {
    #[must_use]
    pub const fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            x: None,
            y: None,
            width: None,
            height: None,
            text: None,
            points: None,
            stroke_color: None,
            background_color: None,
            font_size: None,
        }
    }
}

/// An element with every field defaulted, clamped or stripped so that it is
/// safe to hand to the converter.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedElement {
    pub kind: ElementKind,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Always `Some` with at least two points for arrows, `None` otherwise.
    pub points: Option<Vec<[f64; 2]>>,
    pub text: Option<String>,
    pub stroke_color: Option<String>,
    pub background_color: Option<String>,
    pub font_size: Option<f64>,
}

impl SanitizedElement {
    #[must_use]
    pub fn new(kind: ElementKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            x,
            y,
            width: None,
            height: None,
            points: None,
            text: None,
            stroke_color: None,
            background_color: None,
            font_size: None,
        }
    }

    /// Label text, if present and non-empty.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.is_empty())
    }
}

// =============================================================================
// Render primitives
// =============================================================================

/// A renderer-ready canvas primitive.
///
/// Serializes to the element shape expected by Excalidraw-compatible canvases.
/// The bookkeeping fields (`seed`, `version`, `versionNonce`, `updated`) are
/// zero-initialized; the renderer owns change tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderElement {
    pub id: String,
    #[serde(flatten)]
    pub kind: RenderKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub stroke_color: String,
    pub background_color: String,
    pub fill_style: String,
    pub stroke_width: f64,
    pub stroke_style: String,
    pub roughness: u8,
    pub opacity: u8,
    pub group_ids: Vec<String>,
    pub frame_id: Option<String>,
    pub roundness: Option<Roundness>,
    pub seed: u32,
    pub version: u32,
    pub version_nonce: u32,
    pub is_deleted: bool,
    pub bound_elements: Option<Vec<BoundElement>>,
    pub updated: u64,
    pub link: Option<String>,
    pub locked: bool,
}

impl RenderElement {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind.as_str()
    }

    #[must_use]
    pub fn text_props(&self) -> Option<&TextProps> {
        match &self.kind {
            RenderKind::Text(props) => Some(props),
            _ => None,
        }
    }

    #[must_use]
    pub fn arrow_props(&self) -> Option<&ArrowProps> {
        match &self.kind {
            RenderKind::Arrow(props) => Some(props),
            _ => None,
        }
    }

    /// Geometry fields are all finite numbers.
    #[must_use]
    pub fn has_finite_geometry(&self) -> bool {
        let points_finite = self.arrow_props().is_none_or(|arrow| {
            arrow
                .points
                .iter()
                .all(|[px, py]| px.is_finite() && py.is_finite())
        });
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && points_finite
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RenderKind {
    Rectangle,
    Ellipse,
    Diamond,
    Arrow(ArrowProps),
    Text(TextProps),
}

impl RenderKind {
    #[must_use]
    pub const fn shape(shape: ShapeKind) -> Self {
        match shape {
            ShapeKind::Rectangle => Self::Rectangle,
            ShapeKind::Ellipse => Self::Ellipse,
            ShapeKind::Diamond => Self::Diamond,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Diamond => "diamond",
            Self::Arrow(_) => "arrow",
            Self::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrowProps {
    pub points: Vec<[f64; 2]>,
    pub last_committed_point: Option<[f64; 2]>,
    pub start_binding: Option<String>,
    pub end_binding: Option<String>,
    pub start_arrowhead: Option<String>,
    pub end_arrowhead: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextProps {
    pub text: String,
    pub original_text: String,
    pub font_size: f64,
    pub font_family: u8,
    pub text_align: String,
    pub vertical_align: String,
    pub container_id: Option<String>,
    pub line_height: f64,
    pub auto_resize: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Roundness {
    #[serde(rename = "type")]
    pub kind: u8,
}

impl Roundness {
    /// Corner radius that scales with the element size.
    pub const ADAPTIVE: Self = Self { kind: 3 };
    /// Proportional radius used for linear elements.
    pub const PROPORTIONAL: Self = Self { kind: 2 };
}

/// Reference from a container to an element bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundElement {
    #[serde(rename = "type")]
    pub kind: BoundElementKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundElementKind {
    Text,
}

// =============================================================================
// Colours
// =============================================================================

/// Accept `#` followed by 3 to 8 hex digits, or one of the named colours
/// the canvas understands without further interpretation.
#[must_use]
pub fn is_safe_color(value: &str) -> bool {
    if NAMED_COLORS.contains(&value) {
        return true;
    }
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    (3..=8).contains(&digits.len()) && digits.bytes().all(|byte| byte.is_ascii_hexdigit())
}

// =============================================================================
// Configuration
// =============================================================================

/// Controls whether informational and warning diagnostics reach the log.
///
/// Error diagnostics are always logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
}

impl DebugConfig {
    pub const ENV_VAR: &'static str = "CANVAS_DEBUG";

    #[must_use]
    pub const fn enabled() -> Self {
        Self { enabled: true }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Read `CANVAS_DEBUG` from the process environment, falling back to
    /// whether this is a debug build.
    #[must_use]
    pub fn from_env() -> Self {
        let flag = std::env::var(Self::ENV_VAR).ok();
        Self::from_flag(flag.as_deref()).unwrap_or(Self {
            enabled: cfg!(debug_assertions),
        })
    }

    /// Interpret a textual flag. Returns `None` for unset or unrecognised values.
    #[must_use]
    pub fn from_flag(flag: Option<&str>) -> Option<Self> {
        let normalized = flag?.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "1" | "true" | "yes" | "on" => Some(Self::enabled()),
            "0" | "false" | "no" | "off" => Some(Self::disabled()),
            _ => None,
        }
    }

    /// Whether a diagnostic of the given severity should be logged.
    #[must_use]
    pub const fn should_log(self, severity: DiagnosticSeverity) -> bool {
        self.enabled || matches!(severity, DiagnosticSeverity::Error)
    }
}

/// Styling and sizing defaults applied by the render converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub font_size: f64,
    pub font_family: u8,
    /// Horizontal space reserved around a bound label inside its container.
    pub label_padding: f64,
    pub stroke_color: String,
    pub background_color: String,
    pub stroke_width: f64,
    pub roughness: u8,
    pub opacity: u8,
    pub rectangle_size: [f64; 2],
    pub ellipse_size: [f64; 2],
    pub diamond_size: [f64; 2],
    pub metrics: TextMetrics,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            font_size: 20.0,
            font_family: 1,
            label_padding: 16.0,
            stroke_color: "#1e1e1e".to_string(),
            background_color: "transparent".to_string(),
            stroke_width: 2.0,
            roughness: 1,
            opacity: 100,
            rectangle_size: [160.0, 80.0],
            ellipse_size: [140.0, 80.0],
            diamond_size: [160.0, 100.0],
            metrics: TextMetrics::default(),
        }
    }
}

impl ConvertConfig {
    /// Size used for a shape that arrived without explicit dimensions.
    #[must_use]
    pub const fn default_size(&self, shape: ShapeKind) -> [f64; 2] {
        match shape {
            ShapeKind::Rectangle => self.rectangle_size,
            ShapeKind::Ellipse => self.ellipse_size,
            ShapeKind::Diamond => self.diamond_size,
        }
    }
}

/// Top-level configuration for a parse pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub debug: DebugConfig,
    pub convert: ConvertConfig,
    /// Labels longer than this many characters are cut.
    pub text_limit: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            debug: DebugConfig::default(),
            convert: ConvertConfig::default(),
            text_limit: DEFAULT_TEXT_LIMIT,
        }
    }
}

impl ParserConfig {
    /// Default configuration with the debug flag taken from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            debug: DebugConfig::from_env(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    #[default]
    Info,
    Warning,
    Error,
}

impl DiagnosticSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticStage {
    #[default]
    Extraction,
    Recovery,
    Structure,
    Validation,
    Sanitization,
    Conversion,
}

impl DiagnosticStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Recovery => "recovery",
            Self::Structure => "structure",
            Self::Validation => "validation",
            Self::Sanitization => "sanitization",
            Self::Conversion => "conversion",
        }
    }
}

/// A message produced while turning a response into canvas elements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub stage: DiagnosticStage,
    pub message: String,
    /// Index of the offending element in the parsed array, when relevant.
    pub element_index: Option<usize>,
    /// Truncated excerpt of the offending input.
    pub excerpt: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        stage: DiagnosticStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            stage,
            message: message.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn error(stage: DiagnosticStage, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, stage, message)
    }

    #[must_use]
    pub fn warning(stage: DiagnosticStage, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, stage, message)
    }

    #[must_use]
    pub fn info(stage: DiagnosticStage, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Info, stage, message)
    }

    #[must_use]
    pub fn with_element(mut self, index: usize) -> Self {
        self.element_index = Some(index);
        self
    }

    #[must_use]
    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, DiagnosticSeverity::Error)
    }

    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self.severity, DiagnosticSeverity::Warning)
    }
}

/// Counts of diagnostics by severity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticCounts {
    pub infos: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl DiagnosticCounts {
    #[must_use]
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut counts = Self::default();
        for diag in diagnostics {
            match diag.severity {
                DiagnosticSeverity::Info => counts.infos += 1,
                DiagnosticSeverity::Warning => counts.warnings += 1,
                DiagnosticSeverity::Error => counts.errors += 1,
            }
        }
        counts
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.infos + self.warnings + self.errors
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Why a parsed item was rejected before sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("element is not an object (found {found})")]
    NotAnObject { found: &'static str },
    #[error("element has no non-empty string `type`")]
    MissingType,
    #[error("arrow `points` is not an array")]
    PointsNotArray,
    #[error("text element `text` is not a string")]
    TextNotString,
    #[error("field `{field}` is not a number")]
    NotANumber { field: &'static str },
}

/// Why a sanitized element could not be turned into render primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("{kind} element produced non-finite geometry")]
    NonFiniteGeometry { kind: String },
}

/// Short JSON type name used in diagnostics.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
