use crate::classify::{AspectRatio, MutationPath, classify_element};
use crate::document::{Document, NodeId};
use crate::measure::Measure;
use crate::mutate::{fill_color, fill_image, mutate_group, mutate_text, owning_text};
use crate::placeholder::{Delimiters, TokenMatcher};
use crate::promote::promote_shape;
use crate::truncate::{TruncateOptions, TruncateOutcome, truncate_overflow};
use std::collections::BTreeMap;

/// Element id to column name. Static for a whole batch.
pub type Mapping = BTreeMap<String, String>;

/// Column name to cell value for one row.
pub type DataRow = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct BindOptions {
    pub delimiters: Vec<Delimiters>,
    pub aspect: AspectRatio,
    pub truncate: TruncateOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedField {
    pub element_id: String,
    pub path: MutationPath,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Blank or missing cell; the field is intentionally left as designed.
    EmptyValue,
    MissingElement,
    Measure(String),
    Pattern(String),
    /// Text path found nothing to write into.
    NoTextTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedField {
    pub element_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct RowBinding {
    pub applied: Vec<AppliedField>,
    pub skipped: Vec<SkippedField>,
    /// `text` elements whose content changed, in the order they were bound.
    pub rewritten: Vec<NodeId>,
    pub truncated: Vec<(NodeId, TruncateOutcome)>,
}

/// Bind one row into `doc`. The document must be a fresh parse of the
/// prepared template; nothing here undoes earlier mutations.
pub fn bind_row(
    doc: &mut Document,
    mapping: &Mapping,
    row: &DataRow,
    options: &BindOptions,
    measurer: &dyn Measure,
) -> RowBinding {
    let mut binding = RowBinding::default();
    let delimiters = if options.delimiters.is_empty() {
        vec![Delimiters::default()]
    } else {
        options.delimiters.clone()
    };

    for (element_id, column) in mapping {
        let value = row.get(column).map(String::as_str).unwrap_or_default();
        let skip = |reason: SkipReason| SkippedField {
            element_id: element_id.clone(),
            reason,
        };
        if value.is_empty() {
            log::debug!("{element_id}: column {column} is empty, skipped");
            binding.skipped.push(skip(SkipReason::EmptyValue));
            continue;
        }
        let Some(node) = doc.element_by_id(element_id) else {
            log::warn!("{element_id}: no element with this id in the template");
            binding.skipped.push(skip(SkipReason::MissingElement));
            continue;
        };
        let tag = doc.tag(node).unwrap_or_default().to_string();
        let path = classify_element(&tag, value);
        log::debug!("{element_id}: <{tag}> bound via {path:?}");

        match path {
            MutationPath::ImageFill => fill_image(doc, node, value.trim(), options.aspect),
            MutationPath::ColorFill => fill_color(doc, node, value.trim()),
            MutationPath::PromoteShape => {
                if let Err(err) = promote_shape(doc, node, value.trim(), options.aspect, measurer) {
                    log::warn!("{element_id}: shape not promoted: {err}");
                    binding.skipped.push(skip(SkipReason::Measure(err.to_string())));
                    continue;
                }
            }
            MutationPath::Group | MutationPath::Text => {
                let matcher = match TokenMatcher::new(&delimiters, column) {
                    Ok(matcher) => matcher,
                    Err(err) => {
                        log::warn!("{element_id}: bad placeholder pattern: {err}");
                        binding.skipped.push(skip(SkipReason::Pattern(err.to_string())));
                        continue;
                    }
                };
                let touched = if path == MutationPath::Group {
                    mutate_group(doc, node, &matcher, value)
                } else {
                    mutate_text(doc, node, &matcher, value).map(|_| node).into_iter().collect()
                };
                if touched.is_empty() {
                    binding.skipped.push(skip(SkipReason::NoTextTarget));
                    continue;
                }
                for text in touched.iter().filter_map(|id| owning_text(doc, *id)) {
                    if !binding.rewritten.contains(&text) {
                        binding.rewritten.push(text);
                    }
                }
            }
        }
        binding.applied.push(AppliedField {
            element_id: element_id.clone(),
            path,
        });
    }

    if options.truncate.enabled {
        for text in binding.rewritten.clone() {
            let outcome = truncate_overflow(doc, text, measurer, &options.truncate);
            if let TruncateOutcome::Abandoned(reason) = &outcome {
                log::warn!("truncation abandoned: {reason}");
            }
            binding.truncated.push((text, outcome));
        }
    }
    binding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{BBox, MeasureError, MetricsMeasure};

    struct Unmeasurable;

    impl Measure for Unmeasurable {
        fn bounding_box(&self, _doc: &Document, _node: NodeId) -> Result<BBox, MeasureError> {
            Err(MeasureError::NotRendered)
        }
    }

    fn mapping(pairs: &[(&str, &str)]) -> Mapping {
        pairs
            .iter()
            .map(|(id, column)| (id.to_string(), column.to_string()))
            .collect()
    }

    fn row(pairs: &[(&str, &str)]) -> DataRow {
        mapping(pairs)
    }

    fn no_truncate() -> BindOptions {
        BindOptions {
            truncate: TruncateOptions {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    const TEMPLATE: &str = r##"<svg viewBox="0 0 600 300"><text id="title" x="10" y="40">Title</text><text id="price" x="10" y="80">₹{{Price}}</text><rect id="hero" x="300" y="20" width="280" height="260" fill="#ddd"/><circle id="dot" cx="20" cy="20" r="5" fill="#000"/><image id="logo" href="placeholder.png" width="50" height="50"/></svg>"##;

    #[test]
    fn dispatches_each_mapped_field() {
        let mut doc = Document::parse(TEMPLATE).unwrap();
        let map = mapping(&[
            ("title", "Name"),
            ("price", "Price"),
            ("hero", "Photo"),
            ("dot", "Accent"),
            ("logo", "Logo"),
        ]);
        let data = row(&[
            ("Name", "Summer Sale"),
            ("Price", "499"),
            ("Photo", "https://cdn.example.com/hero.jpg"),
            ("Accent", "#ff6600"),
            ("Logo", "brand.svg"),
        ]);
        let binding = bind_row(&mut doc, &map, &data, &no_truncate(), &Unmeasurable);
        assert!(binding.skipped.is_empty(), "{:?}", binding.skipped);
        assert_eq!(binding.applied.len(), 5);

        let out = doc.to_svg_string();
        assert!(out.contains(r#"<text id="title" x="10" y="40">Summer Sale</text>"#));
        assert!(out.contains("₹499"));
        assert!(out.contains(r#"<image id="hero" x="300" y="20" width="280" height="260""#));
        assert!(out.contains(r##"fill="#ff6600""##));
        assert!(out.contains(r#"href="brand.svg""#));
        assert_eq!(binding.rewritten.len(), 2);
    }

    #[test]
    fn blank_values_and_missing_ids_are_skipped() {
        let mut doc = Document::parse(TEMPLATE).unwrap();
        let map = mapping(&[("title", "Name"), ("ghost", "Name"), ("price", "Price")]);
        let data = row(&[("Name", "Hello"), ("Price", "")]);
        let binding = bind_row(&mut doc, &map, &data, &no_truncate(), &Unmeasurable);
        let reasons: Vec<_> = binding
            .skipped
            .iter()
            .map(|s| (s.element_id.as_str(), s.reason.clone()))
            .collect();
        assert!(reasons.contains(&("ghost", SkipReason::MissingElement)));
        assert!(reasons.contains(&("price", SkipReason::EmptyValue)));
        assert!(doc.to_svg_string().contains("₹{{Price}}"));
    }

    #[test]
    fn whitespace_is_a_value() {
        let mut doc = Document::parse(TEMPLATE).unwrap();
        let binding = bind_row(
            &mut doc,
            &mapping(&[("title", "Name")]),
            &row(&[("Name", " ")]),
            &no_truncate(),
            &Unmeasurable,
        );
        assert!(binding.skipped.is_empty(), "{:?}", binding.skipped);
        assert_eq!(doc.text_content(doc.element_by_id("title").unwrap()), " ");
    }

    #[test]
    fn failed_promotion_skips_only_that_field() {
        let mut doc = Document::parse(TEMPLATE).unwrap();
        let map = mapping(&[("dot", "Photo"), ("title", "Name")]);
        let data = row(&[("Photo", "face.png"), ("Name", "Hi")]);
        let binding = bind_row(&mut doc, &map, &data, &no_truncate(), &Unmeasurable);
        assert_eq!(binding.skipped.len(), 1);
        assert_eq!(binding.skipped[0].element_id, "dot");
        let dot = doc.element_by_id("dot").unwrap();
        assert_eq!(doc.tag(dot), Some("circle"));
        assert_eq!(doc.text_content(doc.element_by_id("title").unwrap()), "Hi");
    }

    #[test]
    fn rewritten_text_is_truncated() {
        let mut doc = Document::parse(
            r#"<svg viewBox="0 0 120 40"><text id="t" x="0" y="20" font-size="20">x</text></svg>"#,
        )
        .unwrap();
        let binding = bind_row(
            &mut doc,
            &mapping(&[("t", "Name")]),
            &row(&[("Name", "An exceedingly long headline for this banner")]),
            &BindOptions::default(),
            &MetricsMeasure::default(),
        );
        assert_eq!(binding.truncated.len(), 1);
        assert!(matches!(binding.truncated[0].1, TruncateOutcome::Truncated { .. }));
        assert!(doc.text_content(doc.element_by_id("t").unwrap()).ends_with("..."));
    }

    #[test]
    fn spans_are_truncated_through_their_text_element() {
        let mut doc = Document::parse(
            r#"<svg viewBox="0 0 600 40"><text id="t"><tspan id="s">a</tspan></text></svg>"#,
        )
        .unwrap();
        let binding = bind_row(
            &mut doc,
            &mapping(&[("s", "Name")]),
            &row(&[("Name", "b")]),
            &BindOptions::default(),
            &MetricsMeasure::default(),
        );
        assert_eq!(binding.rewritten, vec![doc.element_by_id("t").unwrap()]);
        assert_eq!(binding.truncated[0].1, TruncateOutcome::Fits);
    }
}
