use crate::style::FontSource;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::sizer::PixelSize;

#[cfg(feature = "png")]
mod raster;
#[cfg(feature = "png")]
pub use raster::{ResvgBackend, UsvgMeasure};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer rejected the SVG: {0}")]
    Svg(String),
    #[error("failed to allocate a {0}x{1} pixmap")]
    PixmapAlloc(u32, u32),
    #[error("failed to encode PNG")]
    PngEncode,
    #[error("failed to load font {path}: {source}")]
    Font {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Turns a bound SVG document into image bytes of an exact pixel size.
pub trait RasterBackend {
    fn render(&self, svg: &str, size: PixelSize) -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub fonts: Vec<FontSource>,
    /// Fallback family for text that names none the database knows.
    pub default_font_family: Option<String>,
    /// Any SVG color; transparent when unset.
    pub background: Option<String>,
    /// Base for relative `href`s, usually the template's directory.
    pub resources_dir: Option<PathBuf>,
}
