//! Structural checks on raw parsed items.

use dc_core::{ElementKind, ValidatedElement, ValidationError, json_type_name};
use serde_json::{Map, Value};

/// Accept `item` if it is shaped like a diagram element.
///
/// Rules: a non-null object; a non-empty string `type`; arrow `points`, when
/// present, is an array; text `text`, when present, is a string; `x`, `y`,
/// `width`, `height`, when present, are numbers. A JSON `null` counts as a
/// present value.
pub fn validate_element(item: &Value) -> Result<ValidatedElement, ValidationError> {
    let Value::Object(fields) = item else {
        return Err(ValidationError::NotAnObject {
            found: json_type_name(item),
        });
    };

    let type_name = fields
        .get("type")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(ValidationError::MissingType)?;
    let kind = ElementKind::from_type_name(type_name);

    let points = match (&kind, fields.get("points")) {
        (ElementKind::Arrow, Some(Value::Array(points))) => Some(points.clone()),
        (ElementKind::Arrow, Some(_)) => return Err(ValidationError::PointsNotArray),
        _ => None,
    };

    let text = fields.get("text").cloned();
    if kind == ElementKind::Text && text.as_ref().is_some_and(|text| !text.is_string()) {
        return Err(ValidationError::TextNotString);
    }

    Ok(ValidatedElement {
        x: number_field(fields, "x")?,
        y: number_field(fields, "y")?,
        width: number_field(fields, "width")?,
        height: number_field(fields, "height")?,
        text,
        points,
        stroke_color: fields.get("strokeColor").cloned(),
        background_color: fields.get("backgroundColor").cloned(),
        font_size: fields.get("fontSize").cloned(),
        kind,
    })
}

fn number_field(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, ValidationError> {
    match fields.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or(ValidationError::NotANumber { field }),
    }
}
