use serde::{Deserialize, Serialize};
use std::str::FromStr;

const IMAGE_EXTENSIONS: [&str; 9] = [
    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif", "ico",
];

const SHAPE_TAGS: [&str; 7] = ["rect", "path", "circle", "ellipse", "polygon", "polyline", "line"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    ImageReference,
    ColorValue,
    PlainText,
}

/// Sniff a bound value: image references are URLs, data URIs or paths with a
/// known image extension; colors are anything the SVG color grammar accepts.
pub fn classify_value(value: &str) -> ValueKind {
    let trimmed = value.trim();
    if is_image_reference(trimmed) {
        ValueKind::ImageReference
    } else if svgtypes::Color::from_str(trimmed).is_ok() {
        ValueKind::ColorValue
    } else {
        ValueKind::PlainText
    }
}

fn is_image_reference(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:") {
        return true;
    }
    let path = lower
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    path.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && IMAGE_EXTENSIONS.contains(&ext))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPath {
    ImageFill,
    PromoteShape,
    ColorFill,
    Group,
    Text,
}

pub fn is_shape(tag: &str) -> bool {
    SHAPE_TAGS.contains(&tag)
}

pub fn classify_element(tag: &str, value: &str) -> MutationPath {
    match tag {
        "image" => MutationPath::ImageFill,
        "g" | "a" | "switch" | "svg" => MutationPath::Group,
        shape if is_shape(shape) => match classify_value(value) {
            ValueKind::ImageReference => MutationPath::PromoteShape,
            ValueKind::ColorValue | ValueKind::PlainText => MutationPath::ColorFill,
        },
        _ => MutationPath::Text,
    }
}

/// How an image fills its target box. One policy applies to every image
/// operation in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    /// Scale to fit without cropping.
    #[default]
    Contain,
    /// Scale to fill, cropping the overflow.
    Cover,
}

impl AspectRatio {
    pub fn preserve_aspect_ratio(self) -> &'static str {
        match self {
            AspectRatio::Contain => "xMidYMid meet",
            AspectRatio::Cover => "xMidYMid slice",
        }
    }
}
