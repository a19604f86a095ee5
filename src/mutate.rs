use crate::classify::AspectRatio;
use crate::document::{Document, NodeId};
use crate::placeholder::{
    CASCADE, Resolution, Strategy, TOKEN_STRATEGIES, TextView, TokenMatcher, resolve,
};

/// Elements that carry character data.
pub fn is_text_bearing(tag: &str) -> bool {
    matches!(tag, "text" | "tspan" | "textPath")
}

/// Formatting elements allowed inside a text element.
pub fn is_inline_formatting(tag: &str) -> bool {
    matches!(tag, "tspan" | "textPath" | "a")
}

pub fn inline_children(doc: &Document, node: NodeId) -> Vec<NodeId> {
    doc.element_children(node)
        .filter(|child| doc.tag(*child).is_some_and(is_inline_formatting))
        .collect()
}

/// Nearest `text` element at or above `node`; the unit truncation measures.
pub fn owning_text(doc: &Document, node: NodeId) -> Option<NodeId> {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .find(|id| doc.tag(*id) == Some("text"))
}

fn text_view(doc: &Document, node: NodeId) -> (TextView, Vec<NodeId>) {
    let text_nodes = doc.text_nodes(node);
    let view = TextView {
        fragments: text_nodes
            .iter()
            .filter_map(|id| doc.text(*id))
            .map(str::to_string)
            .collect(),
        formatting_children: inline_children(doc, node).len(),
    };
    (view, text_nodes)
}

fn apply(doc: &mut Document, node: NodeId, text_nodes: &[NodeId], resolution: Resolution) {
    match resolution {
        Resolution::Fragments(fragments) => {
            for (id, text) in text_nodes.iter().zip(fragments) {
                doc.set_text_node(*id, &text);
            }
        }
        Resolution::Collapse(text) | Resolution::OverwriteAll(text) => doc.set_text(node, &text),
        Resolution::OverwriteChild(text) => match inline_children(doc, node).first() {
            Some(child) => doc.set_text(*child, &text),
            None => doc.set_text(node, &text),
        },
    }
}

/// Rewrite one text-bearing element, running the full five-step cascade.
pub fn mutate_text(
    doc: &mut Document,
    node: NodeId,
    matcher: &TokenMatcher,
    value: &str,
) -> Option<Strategy> {
    run_strategies(doc, node, matcher, value, &CASCADE)
}

fn run_strategies(
    doc: &mut Document,
    node: NodeId,
    matcher: &TokenMatcher,
    value: &str,
    strategies: &[Strategy],
) -> Option<Strategy> {
    let (view, text_nodes) = text_view(doc, node);
    let resolved = resolve(&view, matcher, value, strategies)?;
    log::debug!("text strategy {:?}", resolved.strategy);
    apply(doc, node, &text_nodes, resolved.resolution);
    Some(resolved.strategy)
}

/// Resolve a value bound to a container. Only text-bearing descendants are
/// touched, so icons and other siblings keep their markup. Returns the
/// descendants that were rewritten.
pub fn mutate_group(
    doc: &mut Document,
    group: NodeId,
    matcher: &TokenMatcher,
    value: &str,
) -> Vec<NodeId> {
    let candidates: Vec<NodeId> = doc
        .descendants(group)
        .into_iter()
        .filter(|node| doc.tag(*node).is_some_and(is_text_bearing))
        .collect();

    let mut updated: Vec<NodeId> = Vec::new();
    for node in &candidates {
        // A collapse on an earlier text element detaches its spans, and a
        // fragment rewrite already covered them.
        if !doc.is_attached(*node)
            || doc.ancestors(*node).any(|ancestor| updated.contains(&ancestor))
        {
            continue;
        }
        if run_strategies(doc, *node, matcher, value, &TOKEN_STRATEGIES).is_some() {
            updated.push(*node);
        }
    }

    if updated.is_empty() {
        if let Some(first) = candidates.first() {
            run_strategies(doc, *first, matcher, value, &[Strategy::IdentifierOverwrite]);
            updated.push(*first);
        } else {
            log::debug!("group has no text descendants; left unchanged");
        }
    }
    updated
}

/// Point an `<image>` at `value`, keeping whichever href attribute it uses.
pub fn fill_image(doc: &mut Document, node: NodeId, value: &str, aspect: AspectRatio) {
    let name = doc.href_attr_name(node).unwrap_or("href").to_string();
    doc.set_attr(node, &name, value);
    doc.set_attr(node, "preserveAspectRatio", aspect.preserve_aspect_ratio());
}

/// Set `fill`, dropping any `fill` declaration in `style` that would win over it.
pub fn fill_color(doc: &mut Document, node: NodeId, value: &str) {
    doc.set_attr(node, "fill", value);
    if let Some(style) = doc.attr(node, "style").map(str::to_string) {
        let kept = remove_style_property(&style, "fill");
        if kept.is_empty() {
            doc.remove_attr(node, "style");
        } else {
            doc.set_attr(node, "style", &kept);
        }
    }
}

fn remove_style_property(style: &str, name: &str) -> String {
    style
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .filter(|decl| {
            decl.split_once(':')
                .is_none_or(|(key, _)| key.trim() != name)
        })
        .collect::<Vec<_>>()
        .join("; ")
}
