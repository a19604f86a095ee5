use crate::document::{Document, NodeId};
use crate::text_metrics;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeasureError {
    #[error("element is not attached to the document")]
    Detached,
    #[error("element produced no rendered geometry")]
    NotRendered,
    #[error("cannot measure <{0}> elements")]
    Unsupported(String),
    #[error("failed to render document for measurement: {0}")]
    Render(String),
}

/// Axis-aligned box in the element's own user space (its `transform`
/// excluded), the same frame `getBBox` reports in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn union(&self, other: &BBox) -> BBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BBox::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }

    fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<BBox> {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for (x, y) in iter {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(BBox::new(
            min_x as f32,
            min_y as f32,
            (max_x - min_x) as f32,
            (max_y - min_y) as f32,
        ))
    }
}

pub trait Measure {
    fn bounding_box(&self, doc: &Document, node: NodeId) -> Result<BBox, MeasureError>;
}

/// Estimates boxes without rendering: text from font advance widths, basic
/// shapes from their geometry attributes, paths from their data (control
/// points included, so curves get a conservative box).
#[derive(Debug, Clone)]
pub struct MetricsMeasure {
    pub default_font_family: String,
    pub default_font_size: f32,
}

impl Default for MetricsMeasure {
    fn default() -> Self {
        Self {
            default_font_family: "sans-serif".to_string(),
            default_font_size: 16.0,
        }
    }
}

impl Measure for MetricsMeasure {
    fn bounding_box(&self, doc: &Document, node: NodeId) -> Result<BBox, MeasureError> {
        if !doc.is_attached(node) {
            return Err(MeasureError::Detached);
        }
        let tag = doc
            .tag(node)
            .ok_or_else(|| MeasureError::Unsupported("#text".to_string()))?;
        let number = |name: &str| doc.attr(node, name).and_then(parse_length).unwrap_or(0.0);
        match tag {
            "text" | "tspan" => self.text_box(doc, node),
            "rect" | "image" | "use" | "foreignObject" => Ok(BBox::new(
                number("x"),
                number("y"),
                number("width"),
                number("height"),
            )),
            "circle" => {
                let r = number("r");
                Ok(BBox::new(number("cx") - r, number("cy") - r, r * 2.0, r * 2.0))
            }
            "ellipse" => {
                let (rx, ry) = (number("rx"), number("ry"));
                Ok(BBox::new(number("cx") - rx, number("cy") - ry, rx * 2.0, ry * 2.0))
            }
            "line" => BBox::from_points([
                (number("x1") as f64, number("y1") as f64),
                (number("x2") as f64, number("y2") as f64),
            ])
            .ok_or(MeasureError::NotRendered),
            "polygon" | "polyline" => {
                let points = doc.attr(node, "points").unwrap_or_default();
                BBox::from_points(svgtypes::PointsParser::from(points))
                    .ok_or(MeasureError::NotRendered)
            }
            "path" => path_box(doc.attr(node, "d").unwrap_or_default()),
            "g" | "a" | "switch" => doc
                .element_children(node)
                .filter_map(|child| self.bounding_box(doc, child).ok())
                .reduce(|acc, bbox| acc.union(&bbox))
                .ok_or(MeasureError::NotRendered),
            other => Err(MeasureError::Unsupported(other.to_string())),
        }
    }
}

impl MetricsMeasure {
    fn text_box(&self, doc: &Document, node: NodeId) -> Result<BBox, MeasureError> {
        let font_size = inherited_property(doc, node, "font-size")
            .and_then(parse_length)
            .unwrap_or(self.default_font_size);
        let font_family = inherited_property(doc, node, "font-family")
            .unwrap_or(&self.default_font_family)
            .to_string();

        let width = text_lines(doc, node)
            .iter()
            .map(|line| {
                text_metrics::measure_text_width(line, font_size, &font_family)
                    .unwrap_or_else(|| text_metrics::fallback_width(line, font_size))
            })
            .fold(0.0f32, f32::max);

        let first_span = doc
            .element_children(node)
            .find(|child| doc.tag(*child) == Some("tspan"));
        let position = |name: &str| {
            doc.attr(node, name)
                .or_else(|| first_span.and_then(|span| doc.attr(span, name)))
                .and_then(parse_length)
                .unwrap_or(0.0)
        };
        let anchor_x = position("x");
        let baseline = position("y");
        let x = match inherited_property(doc, node, "text-anchor") {
            Some("middle") => anchor_x - width / 2.0,
            Some("end") => anchor_x - width,
            _ => anchor_x,
        };
        Ok(BBox::new(x, baseline - font_size * 0.8, width, font_size))
    }
}

/// Split a text element into visual lines: a `tspan` with its own `x` starts
/// a new line once the current one has content.
fn text_lines(doc: &Document, node: NodeId) -> Vec<String> {
    let mut lines = vec![String::new()];
    for child in doc.children(node) {
        if let Some(text) = doc.text(*child) {
            if let Some(current) = lines.last_mut() {
                current.push_str(text);
            }
            continue;
        }
        let starts_line = doc.attr(*child, "x").is_some();
        if starts_line && lines.last().is_some_and(|line| !line.trim().is_empty()) {
            lines.push(String::new());
        }
        if let Some(current) = lines.last_mut() {
            current.push_str(&doc.text_content(*child));
        }
    }
    lines
}

fn path_box(data: &str) -> Result<BBox, MeasureError> {
    use svgtypes::SimplePathSegment as Seg;
    let mut points = Vec::new();
    for segment in svgtypes::SimplifyingPathParser::from(data) {
        let Ok(segment) = segment else {
            break;
        };
        match segment {
            Seg::MoveTo { x, y } | Seg::LineTo { x, y } => points.push((x, y)),
            Seg::Quadratic { x1, y1, x, y } => points.extend([(x1, y1), (x, y)]),
            Seg::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => points.extend([(x1, y1), (x2, y2), (x, y)]),
            Seg::ClosePath => {}
        }
    }
    BBox::from_points(points).ok_or(MeasureError::NotRendered)
}

/// Presentation property from the element or its nearest ancestor, looking at
/// the `style` attribute before the plain attribute, as CSS cascades.
pub fn inherited_property<'a>(doc: &'a Document, node: NodeId, name: &str) -> Option<&'a str> {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .find_map(|id| {
            doc.attr(id, "style")
                .and_then(|style| style_property(style, name))
                .or_else(|| doc.attr(id, name))
        })
}

pub fn style_property<'a>(style: &'a str, name: &str) -> Option<&'a str> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
}

/// First length of a length or length list, in user units. Absolute units
/// are converted at 96 per inch; relative ones (`%`, `em`, `ex`) yield `None`.
pub fn parse_length(value: &str) -> Option<f32> {
    use svgtypes::LengthUnit;

    let first = value
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .find(|part| !part.is_empty())?;
    let length = svgtypes::Length::from_str(first).ok()?;
    let per_unit = match length.unit {
        LengthUnit::None | LengthUnit::Px => 1.0,
        LengthUnit::In => 96.0,
        LengthUnit::Cm => 96.0 / 2.54,
        LengthUnit::Mm => 96.0 / 25.4,
        LengthUnit::Pt => 4.0 / 3.0,
        LengthUnit::Pc => 16.0,
        LengthUnit::Em | LengthUnit::Ex | LengthUnit::Percent => return None,
    };
    Some((length.number * per_unit) as f32).filter(|n| n.is_finite())
}
