//! Defaulting, clamping and stripping of validated elements.
//!
//! Sanitization never rejects: every validated element comes out renderable.
//! Each change is reported as an [`Adjustment`] so the caller can log it.

use std::fmt;

use dc_core::{
    DEFAULT_ARROW_POINTS, DEFAULT_COORDINATE, DEFAULT_HEIGHT, DEFAULT_WIDTH, ElementKind,
    SanitizedElement, ValidatedElement, is_safe_color, json_type_name,
};
use serde_json::Value;

/// A change the sanitizer made to an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    CoordinateDefaulted { field: &'static str },
    SizeDefaulted { field: &'static str, was: f64 },
    ArrowPointsDefaulted { supplied: usize },
    PointComponentZeroed { index: usize },
    TextCoerced { from: &'static str },
    TextTruncated { chars: usize },
    ColorStripped { field: &'static str },
    FontSizeDropped,
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoordinateDefaulted { field } => {
                write!(f, "`{field}` missing or not finite; defaulted to {DEFAULT_COORDINATE}")
            }
            Self::SizeDefaulted { field, was } => {
                write!(f, "`{field}` was {was}; replaced with default")
            }
            Self::ArrowPointsDefaulted { supplied } => write!(
                f,
                "arrow had {supplied} point(s); replaced with default segment"
            ),
            Self::PointComponentZeroed { index } => {
                write!(f, "point {index} had a non-numeric component; set to 0")
            }
            Self::TextCoerced { from } => write!(f, "`text` coerced from {from} to string"),
            Self::TextTruncated { chars } => write!(f, "`text` truncated from {chars} chars"),
            Self::ColorStripped { field } => {
                write!(f, "`{field}` is not an allowed colour; removed")
            }
            Self::FontSizeDropped => f.write_str("`fontSize` is not a positive number; removed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub element: SanitizedElement,
    pub adjustments: Vec<Adjustment>,
}

/// Make `element` safe to render. Labels longer than `text_limit` characters
/// are cut.
#[must_use]
pub fn sanitize_element(element: ValidatedElement, text_limit: usize) -> Sanitized {
    let mut adjustments = Vec::new();

    let x = coordinate(element.x, "x", &mut adjustments);
    let y = coordinate(element.y, "y", &mut adjustments);
    let mut sanitized = SanitizedElement::new(element.kind, x, y);

    sanitized.width = size(element.width, "width", DEFAULT_WIDTH, &mut adjustments);
    sanitized.height = size(element.height, "height", DEFAULT_HEIGHT, &mut adjustments);

    if sanitized.kind == ElementKind::Arrow {
        sanitized.points = Some(arrow_points(element.points, &mut adjustments));
    }

    sanitized.text = element
        .text
        .and_then(|text| coerce_text(text, &mut adjustments))
        .map(|text| truncate_text(text, text_limit, &mut adjustments));

    sanitized.stroke_color = color(element.stroke_color, "strokeColor", &mut adjustments);
    sanitized.background_color =
        color(element.background_color, "backgroundColor", &mut adjustments);

    sanitized.font_size = element.font_size.and_then(|value| {
        let size = value.as_f64().filter(|size| size.is_finite() && *size > 0.0);
        if size.is_none() && !value.is_null() {
            adjustments.push(Adjustment::FontSizeDropped);
        }
        size
    });

    Sanitized {
        element: sanitized,
        adjustments,
    }
}

fn coordinate(value: Option<f64>, field: &'static str, adjustments: &mut Vec<Adjustment>) -> f64 {
    match value {
        Some(value) if value.is_finite() => value,
        _ => {
            adjustments.push(Adjustment::CoordinateDefaulted { field });
            DEFAULT_COORDINATE
        }
    }
}

fn size(
    value: Option<f64>,
    field: &'static str,
    default: f64,
    adjustments: &mut Vec<Adjustment>,
) -> Option<f64> {
    let value = value?;
    if value.is_finite() && value > 0.0 {
        return Some(value);
    }
    adjustments.push(Adjustment::SizeDefaulted { field, was: value });
    Some(default)
}

fn arrow_points(points: Option<Vec<Value>>, adjustments: &mut Vec<Adjustment>) -> Vec<[f64; 2]> {
    let points = points.unwrap_or_default();
    if points.len() < 2 {
        adjustments.push(Adjustment::ArrowPointsDefaulted {
            supplied: points.len(),
        });
        return DEFAULT_ARROW_POINTS.to_vec();
    }

    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let (px, py) = match point {
                Value::Array(pair) => (pair.first(), pair.get(1)),
                Value::Object(fields) => (fields.get("x"), fields.get("y")),
                _ => (None, None),
            };
            let px = finite(px);
            let py = finite(py);
            if px.is_none() || py.is_none() {
                adjustments.push(Adjustment::PointComponentZeroed { index });
            }
            [px.unwrap_or(0.0), py.unwrap_or(0.0)]
        })
        .collect()
}

fn finite(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|component| component.is_finite())
}

fn coerce_text(value: Value, adjustments: &mut Vec<Adjustment>) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => {
            adjustments.push(Adjustment::TextCoerced {
                from: json_type_name(&other),
            });
            Some(other.to_string())
        }
    }
}

fn truncate_text(text: String, limit: usize, adjustments: &mut Vec<Adjustment>) -> String {
    let chars = text.chars().count();
    if chars <= limit {
        return text;
    }
    adjustments.push(Adjustment::TextTruncated { chars });
    text.chars().take(limit).collect()
}

fn color(
    value: Option<Value>,
    field: &'static str,
    adjustments: &mut Vec<Adjustment>,
) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(color) if is_safe_color(&color) => Some(color),
        _ => {
            adjustments.push(Adjustment::ColorStripped { field });
            None
        }
    }
}
