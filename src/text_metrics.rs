use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use ttf_parser::Face;

static TEXT_MEASURER: Lazy<Mutex<TextMeasurer>> = Lazy::new(|| Mutex::new(TextMeasurer::new()));

/// Advance used for glyphs no face provides, as a fraction of the font size.
const FALLBACK_ADVANCE: f32 = 0.56;

pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> Option<f32> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut guard = TEXT_MEASURER.lock().ok()?;
    guard.measure(text, font_size, font_family)
}

/// Width estimate when no font can be resolved at all.
pub fn fallback_width(text: &str, font_size: f32) -> f32 {
    text.chars().filter(|ch| *ch != '\n').count() as f32 * font_size * FALLBACK_ADVANCE
}

/// Make a font file available to later measurements. Faces resolved before
/// the call are dropped so the new file can take part in family lookups.
pub fn register_font_file(path: &Path) -> std::io::Result<()> {
    let mut guard = TEXT_MEASURER
        .lock()
        .map_err(|_| std::io::Error::other("text measurer lock poisoned"))?;
    guard.db.load_font_file(path)?;
    guard.cache.clear();
    Ok(())
}

struct TextMeasurer {
    db: Database,
    loaded_system_fonts: bool,
    cache: HashMap<String, Option<FontFace>>,
}

impl TextMeasurer {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            cache: HashMap::new(),
        }
    }

    fn measure(&mut self, text: &str, font_size: f32, font_family: &str) -> Option<f32> {
        let key = normalize_family_key(font_family);
        if !self.cache.contains_key(&key) {
            let face = self.load_face(font_family);
            self.cache.insert(key.clone(), face);
        }
        let face = self.cache.get_mut(&key)?.as_mut()?;
        Some(face.measure_width(&text.replace('\t', "    "), font_size))
    }

    fn load_face(&mut self, font_family: &str) -> Option<FontFace> {
        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }
        let specs = family_specs(font_family);
        let families: Vec<Family<'_>> = specs
            .iter()
            .map(|spec| match spec {
                FamilySpec::Generic(family) => *family,
                FamilySpec::Name(name) => Family::Name(name.as_str()),
            })
            .collect();
        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db
            .with_face_data(id, |data, index| FontFace::new(data.to_vec(), index))
            .flatten()
    }
}

enum FamilySpec {
    Generic(Family<'static>),
    Name(String),
}

/// Split a CSS `font-family` list into query families, mapping generic and
/// platform-alias names onto fontdb's generic families.
fn family_specs(font_family: &str) -> Vec<FamilySpec> {
    let mut specs: Vec<FamilySpec> = font_family
        .split(',')
        .map(|part| part.trim().trim_matches('"').trim_matches('\''))
        .filter(|raw| !raw.is_empty())
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "serif" => FamilySpec::Generic(Family::Serif),
            "sans-serif" | "system-ui" | "-apple-system" | "ui-sans-serif" => {
                FamilySpec::Generic(Family::SansSerif)
            }
            "monospace" | "ui-monospace" => FamilySpec::Generic(Family::Monospace),
            "cursive" => FamilySpec::Generic(Family::Cursive),
            "fantasy" => FamilySpec::Generic(Family::Fantasy),
            _ => FamilySpec::Name(raw.to_string()),
        })
        .collect();
    if specs.is_empty() {
        specs.push(FamilySpec::Generic(Family::SansSerif));
    }
    specs
}

struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    ascii_advances: [u16; 128],
    advance_cache: HashMap<char, Option<u16>>,
}

impl FontFace {
    fn new(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let units_per_em = face.units_per_em().max(1);
        let mut ascii_advances = [0u16; 128];
        for byte in 0u8..=127 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii_advances[byte as usize] = face.glyph_hor_advance(glyph).unwrap_or(0);
            }
        }
        Some(Self {
            data,
            index,
            units_per_em,
            ascii_advances,
            advance_cache: HashMap::new(),
        })
    }

    fn measure_width(&mut self, text: &str, font_size: f32) -> f32 {
        let scale = font_size / self.units_per_em as f32;
        let fallback = font_size * FALLBACK_ADVANCE;
        let face = if text.is_ascii() {
            None
        } else {
            Face::parse(&self.data, self.index).ok()
        };

        let mut width = 0.0f32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let advance = if ch.is_ascii() {
                Some(self.ascii_advances[ch as usize]).filter(|adv| *adv > 0)
            } else if let Some(cached) = self.advance_cache.get(&ch) {
                *cached
            } else {
                let advance = face.as_ref().and_then(|face| {
                    face.glyph_index(ch)
                        .and_then(|glyph| face.glyph_hor_advance(glyph))
                });
                self.advance_cache.insert(ch, advance);
                advance
            };
            width += match advance {
                Some(advance) => advance as f32 * scale,
                None => fallback,
            };
        }
        width.max(0.0)
    }
}

fn normalize_family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_string()
    }
}
