use roxmltree::NodeType;
use std::fmt::Write as _;
use thiserror::Error;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to parse SVG: {0}")]
    Parse(#[from] roxmltree::Error),
    #[error("root element is <{0}>, expected <svg>")]
    NotSvg(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Element {
    /// Qualified name as written in the source (`svg`, `xlink:href` style prefixes kept).
    pub name: String,
    pub attrs: Vec<Attribute>,
}

impl Element {
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Mutable SVG tree. Nodes live in an arena; detached nodes stay allocated
/// but are unreachable from the root.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    pub fn parse(source: &str) -> Result<Self, DocumentError> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let xml = roxmltree::Document::parse_with_options(source, options)?;
        let root = xml.root_element();
        if root.tag_name().name() != "svg" {
            return Err(DocumentError::NotSvg(root.tag_name().name().to_string()));
        }
        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.import(root, None);
        Ok(doc)
    }

    fn import(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        parent: Option<roxmltree::Node<'_, '_>>,
    ) -> NodeId {
        let element = Element {
            name: qualified_tag(node),
            attrs: collect_attributes(node, parent),
        };
        let id = self.push(NodeData::Element(element));
        for child in node.children() {
            let child_id = match child.node_type() {
                NodeType::Element => self.import(child, Some(node)),
                NodeType::Text => self.push(NodeData::Text(child.text().unwrap_or_default().to_string())),
                NodeType::Comment => {
                    self.push(NodeData::Comment(child.text().unwrap_or_default().to_string()))
                }
                _ => continue,
            };
            self.append_child(id, child_id);
        }
        id
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Local tag name of an element node.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::local_name)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(el) = self.element_mut(id) else {
            return;
        };
        if let Some(attr) = el.attrs.iter_mut().find(|attr| attr.name == name) {
            attr.value = value.to_string();
        } else {
            el.attrs.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        let el = self.element_mut(id)?;
        let idx = el.attrs.iter().position(|attr| attr.name == name)?;
        Some(el.attrs.remove(idx).value)
    }

    /// Name of the attribute carrying the element's reference, either plain
    /// `href` or a prefixed `*:href`.
    pub fn href_attr_name(&self, id: NodeId) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|attr| attr.name == "href" || attr.name.ends_with(":href"))
            .map(|attr| attr.name.as_str())
    }

    pub fn href(&self, id: NodeId) -> Option<&str> {
        let name = self.href_attr_name(id)?;
        self.attr(id, name)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), |node| self.parent(*node))
    }

    /// All descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// First element (document order) whose `id` attribute equals `target`.
    pub fn element_by_id(&self, target: &str) -> Option<NodeId> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .find(|node| self.attr(*node, "id") == Some(target))
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|node| node == self.root)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|node| self.text(*node).is_some())
            .collect()
    }

    /// Concatenated character data of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.text_nodes(id)
            .into_iter()
            .filter_map(|node| self.text(node))
            .collect()
    }

    pub fn set_text_node(&mut self, id: NodeId, value: &str) {
        if let NodeData::Text(text) = &mut self.nodes[id.0].data {
            *text = value.to_string();
        }
    }

    /// Replace every child of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, value: &str) {
        for child in std::mem::take(&mut self.nodes[id.0].children) {
            self.nodes[child.0].parent = None;
        }
        let text = self.push(NodeData::Text(value.to_string()));
        self.append_child(id, text);
    }

    pub fn create_text(&mut self, value: &str) -> NodeId {
        self.push(NodeData::Text(value.to_string()))
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.push(NodeData::Element(Element {
            name: name.to_string(),
            attrs: attrs
                .into_iter()
                .map(|(name, value)| Attribute { name, value })
                .collect(),
        }))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    /// Put `new` at the tree position of `old`; `old` ends up detached.
    /// Returns false when `old` has no parent.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> bool {
        let Some(parent) = self.nodes[old.0].parent else {
            return false;
        };
        self.detach(new);
        let Some(index) = self.nodes[parent.0]
            .children
            .iter()
            .position(|child| *child == old)
        else {
            return false;
        };
        self.nodes[parent.0].children[index] = new;
        self.nodes[new.0].parent = Some(parent);
        self.nodes[old.0].parent = None;
        true
    }

    pub fn to_svg_string(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for attr in &el.attrs {
                    let _ = write!(out, " {}=\"{}\"", attr.name, escape_attr(&attr.value));
                }
                let children = &self.nodes[id.0].children;
                if children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in children {
                    self.write_node(*child, out);
                }
                let _ = write!(out, "</{}>", el.name);
            }
            NodeData::Text(text) => out.push_str(&escape_text(text)),
            NodeData::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
        }
    }
}

fn qualified_tag(node: roxmltree::Node<'_, '_>) -> String {
    let tag = node.tag_name();
    match tag.namespace().and_then(|ns| node.lookup_prefix(ns)) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", tag.name()),
        _ => tag.name().to_string(),
    }
}

fn collect_attributes(
    node: roxmltree::Node<'_, '_>,
    parent: Option<roxmltree::Node<'_, '_>>,
) -> Vec<Attribute> {
    let inherited: Vec<(Option<String>, String)> = parent
        .map(|p| {
            p.namespaces()
                .into_iter()
                .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
                .collect()
        })
        .unwrap_or_default();

    let mut attrs = Vec::new();
    for ns in node.namespaces() {
        if ns.uri() == XML_NS {
            continue;
        }
        let key = (ns.name().map(str::to_string), ns.uri().to_string());
        if inherited.contains(&key) {
            continue;
        }
        let name = match ns.name() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        attrs.push(Attribute {
            name,
            value: ns.uri().to_string(),
        });
    }

    for attr in node.attributes() {
        let name = match attr.namespace() {
            Some(XML_NS) => format!("xml:{}", attr.name()),
            Some(ns) => match node.lookup_prefix(ns) {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", attr.name()),
                _ => attr.name().to_string(),
            },
            None => attr.name().to_string(),
        };
        attrs.push(Attribute {
            name,
            value: attr.value().to_string(),
        });
    }
    attrs
}

fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="100" height="50">
  <!-- banner -->
  <g id="card"><text id="title" x="4">Hello <tspan font-weight="bold">World</tspan></text></g>
  <image id="logo" xlink:href="logo.png"/>
</svg>"##;

    #[test]
    fn round_trips_namespaces_and_prefixed_attributes() {
        let doc = Document::parse(SAMPLE).unwrap();
        let out = doc.to_svg_string();
        assert!(out.starts_with("<svg "));
        assert!(out.contains("xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(out.contains("xmlns:xlink=\"http://www.w3.org/1999/xlink\""));
        assert!(out.contains("xlink:href=\"logo.png\""));
        assert!(out.contains("<!-- banner -->"));
        let reparsed = Document::parse(&out).unwrap();
        let logo = reparsed.element_by_id("logo").unwrap();
        assert_eq!(reparsed.href(logo), Some("logo.png"));
        assert_eq!(reparsed.href_attr_name(logo), Some("xlink:href"));
    }

    #[test]
    fn rejects_non_svg_root() {
        let err = Document::parse("<html/>").unwrap_err();
        assert!(matches!(err, DocumentError::NotSvg(name) if name == "html"));
    }

    #[test]
    fn text_content_concatenates_nested_spans() {
        let doc = Document::parse(SAMPLE).unwrap();
        let title = doc.element_by_id("title").unwrap();
        assert_eq!(doc.text_content(title), "Hello World");
        assert_eq!(doc.text_nodes(title).len(), 2);
    }

    #[test]
    fn element_by_id_returns_first_match() {
        let doc =
            Document::parse(r#"<svg><text id="a">one</text><text id="a">two</text></svg>"#)
                .unwrap();
        let first = doc.element_by_id("a").unwrap();
        assert_eq!(doc.text_content(first), "one");
    }

    #[test]
    fn replace_node_keeps_position() {
        let mut doc = Document::parse(r#"<svg><rect id="a"/><rect id="b"/><rect id="c"/></svg>"#)
            .unwrap();
        let b = doc.element_by_id("b").unwrap();
        let image = doc.create_element("image", vec![("id".to_string(), "b".to_string())]);
        assert!(doc.replace_node(b, image));
        assert_eq!(doc.children(doc.root())[1], image);
        assert!(!doc.is_attached(b));
        assert_eq!(doc.element_by_id("b"), Some(image));
        assert_eq!(
            doc.to_svg_string(),
            r#"<svg><rect id="a"/><image id="b"/><rect id="c"/></svg>"#
        );
    }

    #[test]
    fn set_text_drops_formatting_children() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let title = doc.element_by_id("title").unwrap();
        doc.set_text(title, "A & B");
        assert_eq!(doc.element_children(title).count(), 0);
        assert!(doc.to_svg_string().contains(">A &amp; B</text>"));
    }
}
