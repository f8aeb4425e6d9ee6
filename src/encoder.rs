//! XML encoder for the normalized tree

use crate::error::{Error, Result};
use crate::tree::{Node, Tree};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// One level of indentation
pub const INDENT: &str = "  ";

/// Written first when the declaration is enabled
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Where encoded output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    /// Created if absent, truncated otherwise
    File(PathBuf),
}

impl Destination {
    /// `None` or `-` select standard output
    pub fn from_arg(arg: Option<PathBuf>) -> Self {
        match arg {
            Some(path) if path.as_os_str() != "-" && !path.as_os_str().is_empty() => {
                Self::File(path)
            }
            _ => Self::Stdout,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Stdout => "standard output".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

/// Encodes a tree as indented XML text
pub struct Encoder {
    declaration: bool,
}

impl Encoder {
    /// Create a new encoder; no XML declaration is written
    pub fn new() -> Self {
        Self { declaration: false }
    }

    /// Toggle the leading `<?xml ...?>` declaration
    pub fn with_declaration(mut self, declaration: bool) -> Self {
        self.declaration = declaration;
        self
    }

    /// Encode a tree to a string
    pub fn encode(&self, tree: &Tree) -> String {
        let mut output = String::new();

        if self.declaration {
            output.push_str(XML_DECLARATION);
            output.push('\n');
        }

        for root in &tree.roots {
            self.encode_node(&mut output, root, 0);
        }

        output
    }

    fn encode_node(&self, output: &mut String, node: &Node, depth: usize) {
        let indent = INDENT.repeat(depth);

        output.push_str(&indent);
        output.push('<');
        output.push_str(&node.name);
        for (key, value) in &node.attributes {
            output.push(' ');
            output.push_str(key);
            output.push_str("=\"");
            escape_into(output, value, true);
            output.push('"');
        }

        if node.is_empty() {
            output.push_str("/>\n");
            return;
        }

        output.push('>');

        // A leaf keeps its text on the same line
        if node.children.is_empty() {
            if let Some(text) = &node.text {
                escape_into(output, text, false);
            }
        } else {
            output.push('\n');
            if let Some(text) = &node.text {
                output.push_str(&indent);
                output.push_str(INDENT);
                escape_into(output, text, false);
                output.push('\n');
            }
            for child in &node.children {
                self.encode_node(output, child, depth + 1);
            }
            output.push_str(&indent);
        }

        output.push_str("</");
        output.push_str(&node.name);
        output.push_str(">\n");
    }

    /// Encode a tree directly to a writer
    pub fn encode_to_writer<W: Write>(&self, tree: &Tree, mut writer: W) -> io::Result<()> {
        let encoded = self.encode(tree);
        writer.write_all(encoded.as_bytes())?;
        writer.flush()
    }

    /// Encode a tree to a file, creating or truncating it
    pub fn encode_to_file(&self, tree: &Tree, path: PathBuf) -> Result<()> {
        self.emit(tree, &Destination::File(path))
    }

    /// Encode a tree to `destination`.
    ///
    /// A failure part way through leaves whatever was written in place.
    pub fn emit(&self, tree: &Tree, destination: &Destination) -> Result<()> {
        let output_error = |source| Error::OutputWrite {
            target: destination.describe(),
            source,
        };

        match destination {
            Destination::Stdout => {
                let stdout = io::stdout();
                self.encode_to_writer(tree, stdout.lock())
                    .map_err(output_error)
            }
            Destination::File(path) => {
                let file = fs::File::create(path).map_err(output_error)?;
                self.encode_to_writer(tree, BufWriter::new(file))
                    .map_err(output_error)
            }
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_into(output: &mut String, raw: &str, attribute: bool) {
    for c in raw.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' if attribute => output.push_str("&quot;"),
            '\n' if attribute => output.push_str("&#10;"),
            '\r' if attribute => output.push_str("&#13;"),
            '\t' if attribute => output.push_str("&#9;"),
            _ => output.push(c),
        }
    }
}
