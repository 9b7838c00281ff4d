//! Expansion of sanitized elements into renderer primitives.

use dc_core::{
    ArrowProps, BoundElement, BoundElementKind, ConversionError, ConvertConfig,
    DEFAULT_ARROW_POINTS, ElementKind, IdGenerator, RenderElement, RenderKind, Roundness,
    SanitizedElement, ShapeKind, TextProps, text_id_for,
};

/// Convert one sanitized element into one or two render primitives.
///
/// Shapes with a non-empty label yield the container followed by its bound
/// text. Arrows and free text yield a single primitive. Unknown kinds are
/// drawn as rectangles.
pub fn convert_element(
    element: &SanitizedElement,
    config: &ConvertConfig,
    ids: &mut dyn IdGenerator,
) -> Result<Vec<RenderElement>, ConversionError> {
    let primitives = match element.kind.shape() {
        Some(shape) => shape_with_label(element, shape, config, ids.next_id()),
        None if element.kind == ElementKind::Arrow => vec![arrow(element, config, ids.next_id())],
        None => vec![free_text(element, config, ids.next_id())],
    };

    if primitives.iter().all(RenderElement::has_finite_geometry) {
        Ok(primitives)
    } else {
        Err(ConversionError::NonFiniteGeometry {
            kind: element.kind.as_str().to_string(),
        })
    }
}

fn base(
    id: String,
    kind: RenderKind,
    element: &SanitizedElement,
    config: &ConvertConfig,
) -> RenderElement {
    RenderElement {
        id,
        kind,
        x: element.x,
        y: element.y,
        width: 0.0,
        height: 0.0,
        angle: 0.0,
        stroke_color: element
            .stroke_color
            .clone()
            .unwrap_or_else(|| config.stroke_color.clone()),
        background_color: element
            .background_color
            .clone()
            .unwrap_or_else(|| config.background_color.clone()),
        fill_style: "solid".to_string(),
        stroke_width: config.stroke_width,
        stroke_style: "solid".to_string(),
        roughness: config.roughness,
        opacity: config.opacity,
        group_ids: Vec::new(),
        frame_id: None,
        roundness: None,
        seed: 0,
        version: 0,
        version_nonce: 0,
        is_deleted: false,
        bound_elements: None,
        updated: 0,
        link: None,
        locked: false,
    }
}

fn text_props(
    text: &str,
    font_size: f64,
    config: &ConvertConfig,
    container_id: Option<String>,
) -> TextProps {
    let (text_align, vertical_align) = if container_id.is_some() {
        ("center", "middle")
    } else {
        ("left", "top")
    };
    TextProps {
        text: text.to_string(),
        original_text: text.to_string(),
        font_size,
        font_family: config.font_family,
        text_align: text_align.to_string(),
        vertical_align: vertical_align.to_string(),
        container_id,
        line_height: config.metrics.line_height,
        auto_resize: true,
    }
}

fn shape_with_label(
    element: &SanitizedElement,
    shape: ShapeKind,
    config: &ConvertConfig,
    id: String,
) -> Vec<RenderElement> {
    let [default_width, default_height] = config.default_size(shape);
    let mut container = base(id, RenderKind::shape(shape), element, config);
    container.width = element.width.unwrap_or(default_width);
    container.height = element.height.unwrap_or(default_height);
    container.roundness = match shape {
        ShapeKind::Rectangle | ShapeKind::Diamond => Some(Roundness::ADAPTIVE),
        ShapeKind::Ellipse => None,
    };

    let Some(label) = element.label() else {
        return vec![container];
    };

    let text_id = text_id_for(&container.id);
    let font_size = element.font_size.unwrap_or(config.font_size);
    let (text_width, text_height) = config.metrics.bound_label_size(
        label,
        font_size,
        container.width,
        config.label_padding,
    );

    let mut text = base(
        text_id.clone(),
        RenderKind::Text(text_props(label, font_size, config, Some(container.id.clone()))),
        element,
        config,
    );
    text.x = container.x + (container.width - text_width) / 2.0;
    text.y = container.y + (container.height - text_height) / 2.0;
    text.width = text_width;
    text.height = text_height;
    // The container fill belongs to the shape; the label sits on top of it.
    text.background_color = "transparent".to_string();

    container.bound_elements = Some(vec![BoundElement {
        kind: BoundElementKind::Text,
        id: text_id,
    }]);

    vec![container, text]
}

fn arrow(element: &SanitizedElement, config: &ConvertConfig, id: String) -> RenderElement {
    let points = element
        .points
        .clone()
        .unwrap_or_else(|| DEFAULT_ARROW_POINTS.to_vec());
    let (width, height) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => ((last[0] - first[0]).abs(), (last[1] - first[1]).abs()),
        _ => (0.0, 0.0),
    };

    let mut primitive = base(
        id,
        RenderKind::Arrow(ArrowProps {
            points,
            last_committed_point: None,
            start_binding: None,
            end_binding: None,
            start_arrowhead: None,
            end_arrowhead: Some("arrow".to_string()),
        }),
        element,
        config,
    );
    primitive.width = width;
    primitive.height = height;
    primitive.roundness = Some(Roundness::PROPORTIONAL);
    primitive
}

fn free_text(element: &SanitizedElement, config: &ConvertConfig, id: String) -> RenderElement {
    let label = element.text.as_deref().unwrap_or_default();
    let font_size = element.font_size.unwrap_or(config.font_size);
    let (estimated_width, estimated_height) = config.metrics.free_label_size(label, font_size);

    let mut primitive = base(
        id,
        RenderKind::Text(text_props(label, font_size, config, None)),
        element,
        config,
    );
    primitive.width = element.width.unwrap_or(estimated_width);
    primitive.height = element.height.unwrap_or(estimated_height);
    primitive
}
