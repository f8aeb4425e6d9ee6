//! Normalized document tree shared by both decoders and the encoder

/// Deepest element nesting the decoders accept
pub const MAX_DEPTH: usize = 256;

/// A single element of the document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Element name, including any namespace prefix
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<Node>,
    /// Character data, already trimmed by the decoder that produced it
    pub text: Option<String>,
}

impl Node {
    /// Create an element with no attributes, children or text
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute append
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Builder-style child append
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Builder-style text assignment
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append character data, concatenating with any existing text
    pub fn push_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    /// Look up the first attribute with the given key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True when the element has neither children nor text
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.text.is_none()
    }
}

/// A whole document: the top-level elements in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub roots: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document with exactly one root element
    pub fn with_root(root: Node) -> Self {
        Self { roots: vec![root] }
    }

    /// The first top-level element, if any
    pub fn root(&self) -> Option<&Node> {
        self.roots.first()
    }
}
