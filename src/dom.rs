//! The tree capability the content parser runs over, plus an owned tree built
//! from raw markup with html5ever.

use html5ever::tendril::TendrilSink;
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

/// What the parser needs from a host markup tree. Hosts with a live DOM
/// implement this directly; everything else goes through [`MarkupTree`].
pub trait MarkupNode: Copy {
    /// Lowercase tag name, `None` for text nodes.
    fn tag(&self) -> Option<&str>;
    /// Contents of a text node, `None` for elements.
    fn text(&self) -> Option<&str>;
    fn attribute(&self, name: &str) -> Option<&str>;
    fn children(&self) -> Vec<Self>;
    fn parent(&self) -> Option<Self>;
    /// Resolved value of a CSS property on this node alone (no inheritance).
    fn style(&self, property: &str) -> Option<String>;
    /// Identity comparison: both handles name the same node.
    fn is_same(&self, other: &Self) -> bool;

    fn is_element(&self, name: &str) -> bool {
        self.tag() == Some(name)
    }

    fn has_class(&self, needle: &str) -> bool {
        self.attribute("class")
            .is_some_and(|class| class.split_whitespace().any(|token| token.contains(needle)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned markup tree. Comments, doctypes and processing instructions are
/// dropped while building; whitespace-only text is kept because `<pre>`
/// content depends on it.
#[derive(Debug, Clone)]
pub struct MarkupTree {
    nodes: Vec<NodeData>,
}

impl MarkupTree {
    /// Parse a markup string. Fragments are wrapped in `html`/`body` by the
    /// HTML parsing algorithm; use [`MarkupTree::body`] as the fragment root.
    pub fn parse_html(html: &str) -> Self {
        let dom: RcDom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        let mut tree = MarkupTree {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        };
        let root = tree.root_id();
        for child in dom.document.children.borrow().iter() {
            tree.convert(child, root);
        }
        tree
    }

    fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    fn convert(&mut self, handle: &Handle, parent: NodeId) {
        let kind = match &handle.data {
            RcNodeData::Text { contents } => NodeKind::Text(contents.borrow().to_string()),
            RcNodeData::Element { name, attrs, .. } => NodeKind::Element {
                tag: name.local.to_string().to_ascii_lowercase(),
                attributes: attrs
                    .borrow()
                    .iter()
                    .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                    .collect(),
            },
            RcNodeData::Document
            | RcNodeData::Doctype { .. }
            | RcNodeData::Comment { .. }
            | RcNodeData::ProcessingInstruction { .. } => return,
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);

        for child in handle.children.borrow().iter() {
            self.convert(child, id);
        }
    }

    pub fn node(&self, id: NodeId) -> Node<'_> {
        Node { tree: self, id }
    }

    pub fn root(&self) -> Node<'_> {
        self.node(self.root_id())
    }

    /// The `<body>` element, or the document node if there is none.
    pub fn body(&self) -> Node<'_> {
        self.root()
            .find_descendant(|node| node.is_element("body"))
            .unwrap_or_else(|| self.root())
    }
}

/// A cheap handle to one node of a [`MarkupTree`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    tree: &'a MarkupTree,
    id: NodeId,
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data().kind {
            NodeKind::Document => write!(f, "#document"),
            NodeKind::Element { tag, .. } => write!(f, "<{tag}>"),
            NodeKind::Text(text) => write!(f, "{text:?}"),
        }
    }
}

impl<'a> Node<'a> {
    fn data(&self) -> &'a NodeData {
        &self.tree.nodes[self.id.0]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn find_descendant(
        &self,
        predicate: impl Fn(&Node<'a>) -> bool + Copy,
    ) -> Option<Node<'a>> {
        for child in self.children() {
            if predicate(&child) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(predicate) {
                return Some(found);
            }
        }
        None
    }
}

impl MarkupNode for Node<'_> {
    fn tag(&self) -> Option<&str> {
        match &self.data().kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    fn text(&self) -> Option<&str> {
        match &self.data().kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        match &self.data().kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    fn children(&self) -> Vec<Self> {
        self.data()
            .children
            .iter()
            .map(|&id| Node {
                tree: self.tree,
                id,
            })
            .collect()
    }

    fn parent(&self) -> Option<Self> {
        self.data().parent.map(|id| Node {
            tree: self.tree,
            id,
        })
    }

    fn style(&self, property: &str) -> Option<String> {
        if property == "display" && self.attribute("hidden").is_some() {
            return Some("none".to_string());
        }
        inline_style(self.attribute("style")?, property)
    }

    fn is_same(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

/// Look up one declaration in an inline `style` attribute. Later
/// declarations win, as in CSS.
pub fn inline_style(style: &str, property: &str) -> Option<String> {
    style
        .split(';')
        .filter_map(|declaration| declaration.split_once(':'))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case(property))
        .map(|(_, value)| {
            value
                .trim()
                .trim_end_matches("!important")
                .trim()
                .to_string()
        })
        .next_back()
}

/// Text content of a node and all of its descendants, unmodified.
pub fn text_content<N: MarkupNode>(node: N) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text<N: MarkupNode>(node: N, out: &mut String) {
    if let Some(text) = node.text() {
        out.push_str(text);
        return;
    }
    for child in node.children() {
        collect_text(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fragment_lands_in_body() {
        let tree = MarkupTree::parse_html("<p class=\"a b\">Hi <b>there</b></p>");
        let body = tree.body();
        assert_eq!(body.tag(), Some("body"));
        let p = body.children()[0];
        assert_eq!(p.tag(), Some("p"));
        assert!(p.has_class("b"));
        assert_eq!(text_content(p), "Hi there");
        assert_eq!(p.children()[1].parent().map(|n| n.id()), Some(p.id()));
    }

    #[test]
    fn inline_style_lookup() {
        assert_eq!(
            inline_style("color: red; display:none !important", "display"),
            Some("none".to_string())
        );
        assert_eq!(
            inline_style("color: red; color: blue", "color"),
            Some("blue".to_string())
        );
        assert_eq!(inline_style("color: red", "background-color"), None);
    }

    #[test]
    fn hidden_attribute_reads_as_display_none() {
        let tree = MarkupTree::parse_html("<div hidden>x</div>");
        let div = tree.body().children()[0];
        assert_eq!(div.style("display").as_deref(), Some("none"));
    }

    #[test]
    fn preformatted_whitespace_survives() {
        let tree = MarkupTree::parse_html("<pre>  a\n    b</pre>");
        let pre = tree.body().children()[0];
        assert_eq!(text_content(pre), "  a\n    b");
    }
}
