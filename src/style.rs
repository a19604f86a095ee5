use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A font file made available to every banner in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontSource {
    pub family: String,
    pub path: PathBuf,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

/// CSS injected into every template: one `@font-face` rule per configured font
/// and, when `default_family` is set, a rule giving all text that family.
/// Note that stylesheet rules win over `font-family` presentation attributes.
pub fn font_style_block(fonts: &[FontSource], default_family: Option<&str>) -> String {
    let mut css = String::new();
    for font in fonts {
        css.push_str(&format!(
            "@font-face {{ font-family: '{}'; src: url('{}');",
            css_string(&font.family),
            css_string(&font.path.to_string_lossy())
        ));
        if let Some(weight) = &font.weight {
            css.push_str(&format!(" font-weight: {weight};"));
        }
        if let Some(style) = &font.style {
            css.push_str(&format!(" font-style: {style};"));
        }
        css.push_str(" }\n");
    }
    if let Some(family) = default_family.map(str::trim).filter(|f| !f.is_empty()) {
        css.push_str(&format!(
            "text, tspan {{ font-family: '{}', sans-serif; }}\n",
            css_string(family)
        ));
    }
    css
}

fn css_string(input: &str) -> String {
    input.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_font_face_rules() {
        let fonts = vec![FontSource {
            family: "Noto Sans".to_string(),
            path: PathBuf::from("/fonts/NotoSans-Bold.ttf"),
            weight: Some("700".to_string()),
            style: None,
        }];
        let css = font_style_block(&fonts, Some("Noto Sans"));
        assert!(css.contains(
            "@font-face { font-family: 'Noto Sans'; src: url('/fonts/NotoSans-Bold.ttf'); font-weight: 700; }"
        ));
        assert!(css.contains("text, tspan { font-family: 'Noto Sans', sans-serif; }"));
    }

    #[test]
    fn empty_without_fonts() {
        assert!(font_style_block(&[], None).is_empty());
        assert!(font_style_block(&[], Some("  ")).is_empty());
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(css_string("O'Neil"), "O\\'Neil");
    }
}
