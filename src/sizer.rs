use crate::document::{Document, DocumentError};
use crate::measure::parse_length;

pub const DEFAULT_WIDTH: f32 = 800.0;
pub const DEFAULT_HEIGHT: f32 = 400.0;
pub const DEFAULT_SCALE: f32 = 3.0;
const SVG_NS: &str = "http://www.w3.org/2000/svg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBox {
    pub min_x: f32,
    pub min_y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewBox {
    pub fn parse(value: &str) -> Option<Self> {
        let numbers: Vec<f32> = value
            .split(|ch: char| ch.is_whitespace() || ch == ',')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f32>().ok().filter(|n| n.is_finite()))
            .collect::<Option<Vec<_>>>()?;
        let &[min_x, min_y, width, height] = numbers.as_slice() else {
            return None;
        };
        (width > 0.0 && height > 0.0).then_some(Self {
            min_x,
            min_y,
            width,
            height,
        })
    }

    /// View box of a document root, or its declared size when it has none.
    pub fn of_document(doc: &Document) -> Option<Self> {
        let root = doc.root();
        if let Some(view_box) = doc.attr(root, "viewBox").and_then(ViewBox::parse) {
            return Some(view_box);
        }
        let width = doc.attr(root, "width").and_then(parse_length)?;
        let height = doc.attr(root, "height").and_then(parse_length)?;
        (width > 0.0 && height > 0.0).then_some(Self {
            min_x: 0.0,
            min_y: 0.0,
            width,
            height,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SizerOptions {
    pub scale: f32,
    pub default_width: f32,
    pub default_height: f32,
    /// CSS appended to the template's style block (or prepended as a new one).
    pub style_block: String,
}

impl Default for SizerOptions {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
            style_block: String::new(),
        }
    }
}

/// Pristine per-batch template: every row starts from `source`.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    pub source: String,
    /// Template size in user units, before scaling.
    pub base_width: f32,
    pub base_height: f32,
    pub width: f32,
    pub height: f32,
    pub pixel_size: PixelSize,
}

pub fn prepare_template(source: &str, options: &SizerOptions) -> Result<PreparedTemplate, DocumentError> {
    let mut doc = Document::parse(source)?;
    let root = doc.root();
    let scale = if options.scale.is_finite() && options.scale > 0.0 {
        options.scale
    } else {
        DEFAULT_SCALE
    };

    let view_box = doc.attr(root, "viewBox").and_then(ViewBox::parse);
    let declared = |name: &str| {
        doc.attr(root, name)
            .and_then(parse_length)
            .filter(|value| *value > 0.0)
    };
    let base_width = declared("width")
        .or(view_box.map(|vb| vb.width))
        .unwrap_or(options.default_width);
    let base_height = declared("height")
        .or(view_box.map(|vb| vb.height))
        .unwrap_or(options.default_height);

    // Without a view box the scaled canvas would show the template at 1:1 in
    // its top-left corner.
    if view_box.is_none() {
        doc.set_attr(root, "viewBox", &format!("0 0 {base_width} {base_height}"));
    }
    // Renderers drop un-namespaced roots.
    if doc.attr(root, "xmlns").is_none()
        && doc.element(root).is_some_and(|el| !el.name.contains(':'))
    {
        doc.set_attr(root, "xmlns", SVG_NS);
    }
    let width = base_width * scale;
    let height = base_height * scale;
    doc.set_attr(root, "width", &width.to_string());
    doc.set_attr(root, "height", &height.to_string());

    inject_style(&mut doc, &options.style_block);

    log::debug!("template sized {base_width}x{base_height} -> {width}x{height}");
    Ok(PreparedTemplate {
        source: doc.to_svg_string(),
        base_width,
        base_height,
        width,
        height,
        pixel_size: PixelSize {
            width: (width.round() as u32).max(1),
            height: (height.round() as u32).max(1),
        },
    })
}

/// Append to the first existing `<style>` element, or prepend a new one as
/// the root's first child. Existing rules are never removed.
fn inject_style(doc: &mut Document, css: &str) {
    if css.trim().is_empty() {
        return;
    }
    let root = doc.root();
    let existing = doc
        .descendants(root)
        .into_iter()
        .find(|node| doc.tag(*node) == Some("style"));
    match existing {
        Some(style) => {
            let text = doc.create_text(&format!("\n{css}"));
            doc.append_child(style, text);
        }
        None => {
            let style = doc.create_element("style", vec![("type".to_string(), "text/css".to_string())]);
            let text = doc.create_text(css);
            doc.append_child(style, text);
            doc.insert_child(root, 0, style);
        }
    }
}
