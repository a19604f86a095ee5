use crate::classify::AspectRatio;
use crate::document::{Document, NodeId};
use crate::measure::{Measure, MeasureError};

/// Copied from the shape so the image keeps its identity and placement.
const CARRIED_ATTRS: [&str; 7] = [
    "id",
    "class",
    "transform",
    "clip-path",
    "mask",
    "opacity",
    "filter",
];

const RECT_GEOMETRY: [&str; 6] = ["x", "y", "width", "height", "rx", "ry"];

/// Replace a shape with an `<image>` at the same tree position. Rectangles
/// keep their geometry attributes verbatim; other shapes are reduced to their
/// measured bounding box. On a measurement error nothing is changed.
pub fn promote_shape(
    doc: &mut Document,
    node: NodeId,
    href: &str,
    aspect: AspectRatio,
    measurer: &dyn Measure,
) -> Result<NodeId, MeasureError> {
    let Some(element) = doc.element(node) else {
        return Err(MeasureError::Unsupported("#text".to_string()));
    };
    let image_name = match element.name.split_once(':') {
        Some((prefix, _)) => format!("{prefix}:image"),
        None => "image".to_string(),
    };
    let is_rect = element.local_name() == "rect";

    let mut attrs: Vec<(String, String)> = CARRIED_ATTRS
        .iter()
        .filter_map(|name| doc.attr(node, name).map(|v| (name.to_string(), v.to_string())))
        .collect();
    if is_rect {
        attrs.extend(
            RECT_GEOMETRY
                .iter()
                .filter_map(|name| doc.attr(node, name).map(|v| (name.to_string(), v.to_string()))),
        );
    } else {
        let bbox = measurer.bounding_box(doc, node)?;
        attrs.extend([
            ("x".to_string(), bbox.x.to_string()),
            ("y".to_string(), bbox.y.to_string()),
            ("width".to_string(), bbox.width.to_string()),
            ("height".to_string(), bbox.height.to_string()),
        ]);
    }
    attrs.push(("href".to_string(), href.to_string()));
    attrs.push((
        "preserveAspectRatio".to_string(),
        aspect.preserve_aspect_ratio().to_string(),
    ));

    let image = doc.create_element(&image_name, attrs);
    if !doc.replace_node(node, image) {
        return Err(MeasureError::Detached);
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{BBox, MetricsMeasure};

    struct Unmeasurable;

    impl Measure for Unmeasurable {
        fn bounding_box(&self, _doc: &Document, _node: NodeId) -> Result<BBox, MeasureError> {
            Err(MeasureError::NotRendered)
        }
    }

    #[test]
    fn rect_geometry_is_copied_and_id_kept() {
        let mut doc = Document::parse(
            r##"<svg><rect id="hero" x="10" y="20" width="300" height="150" rx="8" fill="#ccc" transform="rotate(2)"/></svg>"##,
        )
        .unwrap();
        let rect = doc.element_by_id("hero").unwrap();
        let image = promote_shape(
            &mut doc,
            rect,
            "https://x/img.png",
            AspectRatio::Contain,
            &Unmeasurable,
        )
        .unwrap();
        assert_eq!(doc.element_by_id("hero"), Some(image));
        assert_eq!(doc.tag(image), Some("image"));
        for (name, value) in [
            ("x", "10"),
            ("y", "20"),
            ("width", "300"),
            ("height", "150"),
            ("rx", "8"),
            ("transform", "rotate(2)"),
            ("href", "https://x/img.png"),
            ("preserveAspectRatio", "xMidYMid meet"),
        ] {
            assert_eq!(doc.attr(image, name), Some(value), "{name}");
        }
        assert_eq!(doc.attr(image, "fill"), None);
    }

    #[test]
    fn other_shapes_use_bounding_box() {
        let mut doc = Document::parse(
            r#"<svg><g><circle id="avatar" cx="50" cy="40" r="25"/></g></svg>"#,
        )
        .unwrap();
        let circle = doc.element_by_id("avatar").unwrap();
        let image = promote_shape(
            &mut doc,
            circle,
            "face.jpg",
            AspectRatio::Cover,
            &MetricsMeasure::default(),
        )
        .unwrap();
        assert_eq!(doc.attr(image, "x"), Some("25"));
        assert_eq!(doc.attr(image, "y"), Some("15"));
        assert_eq!(doc.attr(image, "width"), Some("50"));
        assert_eq!(doc.attr(image, "height"), Some("50"));
        assert!(doc.to_svg_string().contains("<g><image id=\"avatar\""));
    }

    #[test]
    fn failed_measurement_leaves_shape_in_place() {
        let source = r#"<svg><ellipse id="e" cx="1" cy="1" rx="1" ry="1"/></svg>"#;
        let mut doc = Document::parse(source).unwrap();
        let ellipse = doc.element_by_id("e").unwrap();
        let result = promote_shape(&mut doc, ellipse, "a.png", AspectRatio::Contain, &Unmeasurable);
        assert!(matches!(result, Err(MeasureError::NotRendered)));
        assert_eq!(doc.to_svg_string(), source);
    }
}
