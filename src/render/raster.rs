use super::{PixelSize, RasterBackend, RenderError, RenderOptions};
use crate::document::{Document, NodeId};
use crate::measure::{BBox, Measure, MeasureError};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

const MEASURE_ID: &str = "__sbr_measure_target";

pub struct ResvgBackend {
    fontdb: Arc<usvg::fontdb::Database>,
    font_family: String,
    background: Option<resvg::tiny_skia::Color>,
    resources_dir: Option<PathBuf>,
}

impl ResvgBackend {
    /// Loads system fonts plus every configured font file up front, so no row
    /// is rendered before its fonts are available.
    pub fn new(options: &RenderOptions) -> Result<Self, RenderError> {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        for font in &options.fonts {
            fontdb
                .load_font_file(&font.path)
                .map_err(|source| RenderError::Font {
                    path: font.path.clone(),
                    source,
                })?;
            log::debug!("loaded font {} from {}", font.family, font.path.display());
        }
        let configured = options
            .default_font_family
            .clone()
            .or_else(|| options.fonts.first().map(|font| font.family.clone()));
        let font_family = resolve_font_family(&mut fontdb, configured);
        log::debug!("default font family: {font_family}");
        let background = options.background.as_deref().and_then(|value| {
            let color = parse_color(value);
            if color.is_none() {
                log::warn!("ignoring unparsable background color {value:?}");
            }
            color
        });
        Ok(Self {
            fontdb: Arc::new(fontdb),
            font_family,
            background,
            resources_dir: options.resources_dir.clone(),
        })
    }

    /// A measurer sharing this backend's font database.
    pub fn measurer(&self) -> UsvgMeasure {
        UsvgMeasure {
            fontdb: self.fontdb.clone(),
            font_family: self.font_family.clone(),
            resources_dir: self.resources_dir.clone(),
        }
    }

    fn options(&self) -> usvg::Options<'static> {
        usvg_options(&self.fontdb, &self.font_family, self.resources_dir.clone())
    }
}

impl ResvgBackend {
    fn rasterize(&self, svg: &str, size: PixelSize) -> Result<resvg::tiny_skia::Pixmap, RenderError> {
        let tree = usvg::Tree::from_str(svg, &self.options())
            .map_err(|err| RenderError::Svg(err.to_string()))?;
        let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width, size.height)
            .ok_or(RenderError::PixmapAlloc(size.width, size.height))?;
        if let Some(color) = self.background {
            pixmap.fill(color);
        }
        let tree_size = tree.size();
        let transform = resvg::tiny_skia::Transform::from_scale(
            size.width as f32 / tree_size.width(),
            size.height as f32 / tree_size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());
        Ok(pixmap)
    }
}

impl RasterBackend for ResvgBackend {
    fn render(&self, svg: &str, size: PixelSize) -> Result<Vec<u8>, RenderError> {
        self.rasterize(svg, size)?
            .encode_png()
            .map_err(|_| RenderError::PngEncode)
    }
}

const FALLBACK_FAMILIES: [&str; 6] = [
    "Arial",
    "Helvetica",
    "Liberation Sans",
    "DejaVu Sans",
    "Noto Sans",
    "Roboto",
];

fn has_family(fontdb: &usvg::fontdb::Database, family: &str) -> bool {
    fontdb
        .query(&usvg::fontdb::Query {
            families: &[usvg::fontdb::Family::Name(family)],
            ..Default::default()
        })
        .is_some()
}

/// Family used for text that names none. A configured family wins; otherwise
/// the first common sans face that is installed, then any loaded face. The
/// generic `sans-serif` family is pointed at the result as well.
fn resolve_font_family(fontdb: &mut usvg::fontdb::Database, configured: Option<String>) -> String {
    if let Some(family) = configured {
        if !has_family(fontdb, &family) {
            log::warn!("font family {family:?} is not installed; text may not render");
        }
        return family;
    }
    let found = FALLBACK_FAMILIES
        .iter()
        .find(|family| has_family(fontdb, family))
        .map(|family| family.to_string())
        .or_else(|| {
            fontdb
                .faces()
                .find_map(|face| face.families.first().map(|(name, _)| name.clone()))
        });
    match found {
        Some(family) => {
            fontdb.set_sans_serif_family(family.clone());
            family
        }
        None => {
            log::warn!("no fonts were found; text will not be rendered or measured");
            FALLBACK_FAMILIES[0].to_string()
        }
    }
}

fn usvg_options(
    fontdb: &Arc<usvg::fontdb::Database>,
    font_family: &str,
    resources_dir: Option<PathBuf>,
) -> usvg::Options<'static> {
    let mut opt = usvg::Options::default();
    opt.fontdb = fontdb.clone();
    opt.font_family = font_family.to_string();
    opt.resources_dir = resources_dir;
    opt
}

fn parse_color(value: &str) -> Option<resvg::tiny_skia::Color> {
    let color = svgtypes::Color::from_str(value.trim()).ok()?;
    Some(resvg::tiny_skia::Color::from_rgba8(
        color.red,
        color.green,
        color.blue,
        color.alpha,
    ))
}

/// Measures by laying the document out with usvg: the target gets a
/// temporary id in a throwaway copy and its object bounding box is read back.
pub struct UsvgMeasure {
    fontdb: Arc<usvg::fontdb::Database>,
    font_family: String,
    resources_dir: Option<PathBuf>,
}

impl Measure for UsvgMeasure {
    fn bounding_box(&self, doc: &Document, node: NodeId) -> Result<BBox, MeasureError> {
        if !doc.is_attached(node) {
            return Err(MeasureError::Detached);
        }
        if doc.element(node).is_none() {
            return Err(MeasureError::Unsupported("#text".to_string()));
        }
        let mut probe = doc.clone();
        probe.set_attr(node, "id", MEASURE_ID);
        let options = usvg_options(&self.fontdb, &self.font_family, self.resources_dir.clone());
        let tree = usvg::Tree::from_str(&probe.to_svg_string(), &options)
            .map_err(|err| MeasureError::Render(err.to_string()))?;
        let rendered = tree.node_by_id(MEASURE_ID).ok_or(MeasureError::NotRendered)?;
        let rect = rendered.bounding_box();
        Ok(BBox::new(rect.x(), rect.y(), rect.width(), rect.height()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> ResvgBackend {
        ResvgBackend::new(&RenderOptions {
            background: Some("white".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn renders_png_at_requested_size() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="30" height="15" viewBox="0 0 10 5"><rect width="10" height="5" fill="#f00"/></svg>"##;
        let png = backend()
            .render(
                svg,
                PixelSize {
                    width: 30,
                    height: 15,
                },
            )
            .unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn rejects_broken_svg() {
        let result = backend().render(
            "<svg",
            PixelSize {
                width: 1,
                height: 1,
            },
        );
        assert!(matches!(result, Err(RenderError::Svg(_))));
    }

    #[test]
    fn measures_shapes_in_user_space() {
        let doc = Document::parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="300" height="150" viewBox="0 0 100 50"><circle id="c" cx="50" cy="25" r="10"/></svg>"#,
        )
        .unwrap();
        let circle = doc.element_by_id("c").unwrap();
        let bbox = backend().measurer().bounding_box(&doc, circle).unwrap();
        assert!((bbox.x - 40.0).abs() < 0.5, "{bbox:?}");
        assert!((bbox.width - 20.0).abs() < 0.5, "{bbox:?}");
    }

    const HEADLINE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="300" height="60" viewBox="0 0 300 60"><text id="t" x="10" y="40" font-size="24">A headline that is far too long to fit here</text></svg>"#;

    #[test]
    fn default_family_renders_text() {
        let backend = ResvgBackend::new(&RenderOptions::default()).unwrap();
        assert!(has_family(&backend.fontdb, &backend.font_family), "{}", backend.font_family);
        let pixmap = backend
            .rasterize(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="40"><text x="10" y="30" font-size="24">Hello world</text></svg>"#,
                PixelSize {
                    width: 200,
                    height: 40,
                },
            )
            .unwrap();
        let inked = pixmap.pixels().iter().filter(|pixel| pixel.alpha() > 0).count();
        assert!(inked > 0);
    }

    #[test]
    fn default_family_measures_and_truncates_text() {
        use crate::truncate::{TruncateOptions, TruncateOutcome, truncate_overflow};

        let backend = ResvgBackend::new(&RenderOptions::default()).unwrap();
        let measurer = backend.measurer();
        let mut doc = Document::parse(HEADLINE).unwrap();
        let text = doc.element_by_id("t").unwrap();
        let bbox = measurer.bounding_box(&doc, text).unwrap();
        assert!(bbox.width > 0.0, "{bbox:?}");

        let outcome = truncate_overflow(&mut doc, text, &measurer, &TruncateOptions::default());
        assert!(matches!(outcome, TruncateOutcome::Truncated { .. }), "{outcome:?}");
        assert!(doc.text_content(text).ends_with("..."));
        assert!(measurer.bounding_box(&doc, text).unwrap().right() <= 290.0);
    }

    #[test]
    fn background_colors_parse() {
        assert!(parse_color("#336699").is_some());
        assert!(parse_color("not a color").is_none());
    }
}
