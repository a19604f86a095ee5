use crate::document::{Document, NodeId};
use crate::measure::{BBox, Measure};
use crate::mutate::inline_children;
use crate::sizer::ViewBox;

#[derive(Debug, Clone, PartialEq)]
pub struct TruncateOptions {
    pub enabled: bool,
    /// Space kept free between the text and the right edge, in user units.
    pub margin: f32,
    pub ellipsis: String,
}

impl Default for TruncateOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            margin: 10.0,
            ellipsis: "...".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TruncateOutcome {
    Fits,
    Truncated { removed: usize },
    /// Nothing short enough to fit was found; the target span is now empty.
    Emptied,
    /// Measurement failed; the element keeps its untruncated content.
    Abandoned(String),
}

/// Shortens text running past the right edge of the canvas. One trailing
/// character is dropped per step and the ellipsis re-appended, then the whole
/// text element is measured again; this assumes dropping a character never
/// makes the text wider. A combining mark may be split from its base at the
/// cut point.
pub fn truncate_overflow(
    doc: &mut Document,
    text: NodeId,
    measurer: &dyn Measure,
    options: &TruncateOptions,
) -> TruncateOutcome {
    let Some(view_box) = ViewBox::of_document(doc) else {
        return TruncateOutcome::Abandoned("document has no size".to_string());
    };
    let right_edge = view_box.min_x + view_box.width;
    let fits = |bbox: BBox| bbox.width <= right_edge - bbox.x - options.margin;

    match measurer.bounding_box(doc, text) {
        Ok(bbox) if fits(bbox) => return TruncateOutcome::Fits,
        Ok(_) => {}
        Err(err) => return TruncateOutcome::Abandoned(err.to_string()),
    }

    let snapshot = doc.clone();
    let target = inline_children(doc, text).last().copied().unwrap_or(text);
    let mut kept: Vec<char> = doc.text_content(target).chars().collect();
    let mut text_node: Option<NodeId> = None;
    let mut removed = 0usize;

    while kept.pop().is_some() {
        removed += 1;
        let prefix: String = kept.iter().collect();
        let candidate = if prefix.trim().is_empty() {
            String::new()
        } else {
            format!("{}{}", prefix.trim_end(), options.ellipsis)
        };
        match text_node {
            Some(node) => doc.set_text_node(node, &candidate),
            None => {
                doc.set_text(target, &candidate);
                text_node = doc.children(target).first().copied();
            }
        }
        if candidate.is_empty() {
            return TruncateOutcome::Emptied;
        }
        match measurer.bounding_box(doc, text) {
            Ok(bbox) if fits(bbox) => {
                log::debug!("truncated {removed} characters");
                return TruncateOutcome::Truncated { removed };
            }
            Ok(_) => {}
            Err(err) => {
                *doc = snapshot;
                return TruncateOutcome::Abandoned(err.to_string());
            }
        }
    }

    if text_node.is_none() {
        doc.set_text(target, "");
    }
    TruncateOutcome::Emptied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{MeasureError, parse_length};
    use std::cell::Cell;

    /// Every character is 10 units wide; `x` comes from the element.
    struct FixedAdvance;

    impl Measure for FixedAdvance {
        fn bounding_box(&self, doc: &Document, node: NodeId) -> Result<BBox, MeasureError> {
            let x = doc.attr(node, "x").and_then(parse_length).unwrap_or(0.0);
            let width = doc.text_content(node).chars().count() as f32 * 10.0;
            Ok(BBox::new(x, 0.0, width, 10.0))
        }
    }

    /// Succeeds `remaining` times, then fails.
    struct Flaky {
        remaining: Cell<usize>,
    }

    impl Measure for Flaky {
        fn bounding_box(&self, doc: &Document, node: NodeId) -> Result<BBox, MeasureError> {
            if self.remaining.get() == 0 {
                return Err(MeasureError::NotRendered);
            }
            self.remaining.set(self.remaining.get() - 1);
            FixedAdvance.bounding_box(doc, node)
        }
    }

    fn run(source: &str, measurer: &dyn Measure) -> (Document, TruncateOutcome) {
        let mut doc = Document::parse(source).unwrap();
        let node = doc.element_by_id("t").unwrap();
        let outcome = truncate_overflow(&mut doc, node, measurer, &TruncateOptions::default());
        (doc, outcome)
    }

    fn text(doc: &Document) -> String {
        doc.text_content(doc.element_by_id("t").unwrap())
    }

    #[test]
    fn short_text_is_left_alone() {
        let (doc, outcome) = run(
            r#"<svg viewBox="0 0 200 50"><text id="t" x="10">Hello</text></svg>"#,
            &FixedAdvance,
        );
        assert_eq!(outcome, TruncateOutcome::Fits);
        assert_eq!(text(&doc), "Hello");
    }

    #[test]
    fn long_text_shrinks_until_it_fits() {
        // budget = 200 - 10 - 10 = 180 units = 18 characters
        let (doc, outcome) = run(
            r#"<svg viewBox="0 0 200 50"><text id="t" x="10">The quick brown fox jumps over</text></svg>"#,
            &FixedAdvance,
        );
        let result = text(&doc);
        assert!(matches!(outcome, TruncateOutcome::Truncated { .. }));
        assert!(result.ends_with("..."));
        assert!(result.chars().count() <= 18, "{result}");
        assert_eq!(result, "The quick brown...");
    }

    #[test]
    fn last_span_is_the_target() {
        let (doc, _) = run(
            r#"<svg viewBox="0 0 130 50"><text id="t" x="0"><tspan>Name: </tspan><tspan>Bartholomew</tspan></text></svg>"#,
            &FixedAdvance,
        );
        let out = doc.to_svg_string();
        assert!(out.contains("<tspan>Name: </tspan><tspan>Bar...</tspan>"), "{out}");
    }

    #[test]
    fn empties_when_nothing_fits() {
        let (doc, outcome) = run(
            r#"<svg viewBox="0 0 30 50"><text id="t" x="25">Wide</text></svg>"#,
            &FixedAdvance,
        );
        assert_eq!(outcome, TruncateOutcome::Emptied);
        assert_eq!(text(&doc), "");
    }

    #[test]
    fn terminates_for_combining_marks() {
        let long = "e\u{301}".repeat(40);
        let source = format!(r#"<svg viewBox="0 0 100 50"><text id="t" x="0">{long}</text></svg>"#);
        let (doc, outcome) = run(&source, &FixedAdvance);
        assert!(matches!(outcome, TruncateOutcome::Truncated { .. }));
        assert!(text(&doc).chars().count() * 10 <= 90);
    }

    #[test]
    fn measurement_failure_restores_content() {
        let source = r#"<svg viewBox="0 0 50 50"><text id="t" x="0"><tspan>Too long to fit here</tspan></text></svg>"#;
        let (doc, outcome) = run(
            source,
            &Flaky {
                remaining: Cell::new(3),
            },
        );
        assert!(matches!(outcome, TruncateOutcome::Abandoned(_)));
        assert_eq!(doc.to_svg_string(), source);
    }
}
