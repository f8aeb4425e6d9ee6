//! Plain-text XML decoder

use crate::error::{Error, Result};
use crate::tree::{Node, Tree, MAX_DEPTH};
use std::io::Read;

const BOM: char = '\u{feff}';
const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";
const PI_START: &str = "<?";
const PI_END: &str = "?>";
const CDATA_START: &str = "<![CDATA[";
const CDATA_END: &str = "]]>";
const DOCTYPE_START: &str = "<!DOCTYPE";

/// Parses textual XML into a [`Tree`], trimming insignificant whitespace
pub struct Decoder {}

impl Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self {}
    }

    /// Decode a document from a string
    pub fn decode(&self, input: &str) -> Result<Tree> {
        let input = input.strip_prefix(BOM).unwrap_or(input);
        let mut scanner = Scanner::new(input);

        scanner.skip_misc(true)?;
        if scanner.at_end() {
            return Err(scanner.error("expected element"));
        }

        let root = scanner.parse_element(1)?;

        scanner.skip_misc(false)?;
        if !scanner.at_end() {
            return Err(scanner.error("unexpected content after the root element"));
        }

        Ok(Tree::with_root(root))
    }

    /// Read `reader` to the end and decode it as UTF-8
    pub fn decode_reader<R: Read>(&self, mut reader: R) -> Result<Tree> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let input = String::from_utf8(bytes)
            .map_err(|e| Error::decode(format!("input is not valid UTF-8: {e}")))?;
        self.decode(&input)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn line(&self) -> usize {
        self.input[..self.pos].matches('\n').count() + 1
    }

    fn error(&self, message: impl AsRef<str>) -> Error {
        Error::decode(format!("line {}: {}", self.line(), message.as_ref()))
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        if !self.starts_with(s) {
            return Err(self.error(format!("expected '{s}'")));
        }
        self.pos += s.len();
        Ok(())
    }

    /// Consume up to and including `terminator`, returning what came before
    fn take_until(&mut self, terminator: &str, what: &str) -> Result<&'a str> {
        let rest = self.rest();
        let end = rest
            .find(terminator)
            .ok_or_else(|| self.error(format!("unterminated {what}")))?;
        self.pos += end + terminator.len();
        Ok(&rest[..end])
    }

    /// Skip whitespace, comments and processing instructions, plus a
    /// DOCTYPE when still in the prolog
    fn skip_misc(&mut self, prolog: bool) -> Result<()> {
        loop {
            self.skip_whitespace();
            if self.starts_with(COMMENT_START) {
                self.take_until(COMMENT_END, "comment")?;
            } else if self.starts_with(PI_START) {
                self.take_until(PI_END, "processing instruction")?;
            } else if prolog && self.starts_with(DOCTYPE_START) {
                self.skip_doctype()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_doctype(&mut self) -> Result<()> {
        let mut depth = 0usize;
        for (i, c) in self.rest().char_indices() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => {
                    self.pos += i + 1;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(self.error("unterminated DOCTYPE"))
    }

    fn parse_name(&mut self) -> Result<&'a str> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start(c) => {}
            _ => return Err(self.error("expected name")),
        }
        let end = chars
            .find(|&(_, c)| !is_name_char(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += end;
        Ok(&rest[..end])
    }

    fn parse_element(&mut self, depth: usize) -> Result<Node> {
        if depth > MAX_DEPTH {
            return Err(self.error(format!(
                "elements nested deeper than {MAX_DEPTH} levels"
            )));
        }
        self.expect("<")?;
        let name = self.parse_name()?;
        let mut node = Node::new(name);

        loop {
            self.skip_whitespace();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(node);
            }
            if self.starts_with(">") {
                self.pos += 1;
                break;
            }
            if self.at_end() {
                return Err(self.error(format!("unterminated start tag <{name}>")));
            }

            let (key, value) = self.parse_attribute()?;
            if node.attribute(key).is_some() {
                return Err(self.error(format!("duplicate attribute '{key}'")));
            }
            node.attributes.push((key.to_string(), value));
        }

        let mut text = String::new();
        loop {
            if self.at_end() {
                return Err(self.error(format!("unterminated element <{name}>")));
            } else if self.starts_with("</") {
                self.pos += 2;
                let closing = self.parse_name()?;
                if closing != name {
                    return Err(self.error(format!(
                        "mismatched end tag: expected </{name}>, found </{closing}>"
                    )));
                }
                self.skip_whitespace();
                self.expect(">")?;
                break;
            } else if self.starts_with(COMMENT_START) {
                self.take_until(COMMENT_END, "comment")?;
            } else if self.starts_with(CDATA_START) {
                self.pos += CDATA_START.len();
                text.push_str(self.take_until(CDATA_END, "CDATA section")?);
            } else if self.starts_with(PI_START) {
                self.take_until(PI_END, "processing instruction")?;
            } else if self.starts_with("<") {
                let child = self.parse_element(depth + 1)?;
                node.children.push(child);
            } else {
                let rest = self.rest();
                let end = rest.find('<').unwrap_or(rest.len());
                let decoded = self.decode_entities(&rest[..end])?;
                text.push_str(&decoded);
                self.pos += end;
            }
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            node.text = Some(trimmed.to_string());
        }
        Ok(node)
    }

    fn parse_attribute(&mut self) -> Result<(&'a str, String)> {
        let key = self.parse_name()?;
        self.skip_whitespace();
        self.expect("=")?;
        self.skip_whitespace();

        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error(format!("expected quoted value for attribute '{key}'"))),
        };
        self.pos += 1;

        let rest = self.rest();
        let end = rest
            .find(quote)
            .ok_or_else(|| self.error(format!("unterminated value for attribute '{key}'")))?;
        let raw = &rest[..end];
        if raw.contains('<') {
            return Err(self.error(format!("'<' in value of attribute '{key}'")));
        }
        let value = self.decode_entities(raw)?;
        self.pos += end + 1;
        Ok((key, value))
    }

    /// Replace predefined entities and character references
    fn decode_entities(&self, raw: &str) -> Result<String> {
        if !raw.contains('&') {
            return Ok(raw.to_string());
        }

        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            let after = &rest[amp + 1..];
            let semi = after
                .find(';')
                .ok_or_else(|| self.error("unterminated entity reference"))?;
            let entity = &after[..semi];

            let c = match entity {
                "lt" => '<',
                "gt" => '>',
                "amp" => '&',
                "quot" => '"',
                "apos" => '\'',
                _ => parse_char_ref(entity)
                    .ok_or_else(|| self.error(format!("unknown entity '&{entity};'")))?,
            };
            out.push(c);
            rest = &after[semi + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// `#NNN` or `#xHHH`
fn parse_char_ref(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_numeric() || c == '-' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &str) -> Result<Tree> {
        Decoder::new().decode(input)
    }

    #[test]
    fn test_decode_nested() {
        let tree = decode("<a><b/></a>").unwrap();
        assert_eq!(tree, Tree::with_root(Node::new("a").with_child(Node::new("b"))));
    }

    #[test]
    fn test_decode_attributes_in_order() {
        let tree = decode(r#"<m z="1" a='2' android:name="x"/>"#).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(
            root.attributes,
            vec![
                ("z".to_string(), "1".to_string()),
                ("a".to_string(), "2".to_string()),
                ("android:name".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_trims_text() {
        let tree = decode("<a>\n    hello world  \n</a>").unwrap();
        assert_eq!(tree.root().unwrap().text.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_whitespace_only_text_is_dropped() {
        let tree = decode("<a>\n  <b>  </b>\n</a>").unwrap();
        let root = tree.root().unwrap();
        assert!(root.text.is_none());
        assert!(root.children[0].text.is_none());
    }

    #[test]
    fn test_decode_prolog_and_comments() {
        let input = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
                     <!DOCTYPE note [<!ELEMENT note (#PCDATA)>]>\n\
                     <!-- leading -->\n\
                     <note><!-- inner -->text<?pi skip?></note>\n\
                     <!-- trailing -->\n";
        let tree = decode(input).unwrap();
        assert_eq!(tree, Tree::with_root(Node::new("note").with_text("text")));
    }

    #[test]
    fn test_decode_entities_and_cdata() {
        let tree = decode(r#"<a v="&lt;&#65;&#x42;&quot;">1 &amp; 2<![CDATA[ <raw> ]]></a>"#).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(root.attribute("v"), Some("<AB\""));
        assert_eq!(root.text.as_deref(), Some("1 & 2 <raw>"));
    }

    #[test]
    fn test_empty_input_fails() {
        let err = decode("").unwrap_err();
        assert_eq!(err.to_string(), "line 1: expected element");

        let err = decode("   \n  ").unwrap_err();
        assert_eq!(err.to_string(), "line 2: expected element");
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = decode("<a>\n<b></a>").unwrap_err();
        assert_eq!(
            err.to_string(),
            "line 2: mismatched end tag: expected </b>, found </a>"
        );
    }

    #[test]
    fn test_unterminated_element() {
        assert!(decode("<a><b/>").is_err());
        assert!(decode("<a").is_err());
        assert!(decode("<a><!-- open").is_err());
    }

    #[test]
    fn test_nesting_depth_is_limited() {
        let nested = |depth: usize| "<a>".repeat(depth) + &"</a>".repeat(depth);

        let tree = decode(&nested(MAX_DEPTH)).unwrap();
        let encoded = crate::encoder::Encoder::new().encode(&tree);
        assert_eq!(encoded.lines().count(), 2 * MAX_DEPTH - 1);

        let err = decode(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(
            err.to_string(),
            format!("line 1: elements nested deeper than {MAX_DEPTH} levels")
        );
    }

    #[test]
    fn test_second_root_rejected() {
        let err = decode("<a/><b/>").unwrap_err();
        assert!(err.to_string().contains("unexpected content after the root element"));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        assert!(decode(r#"<a x="1" x="2"/>"#).is_err());
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let err = decode("<a>&nbsp;</a>").unwrap_err();
        assert!(err.to_string().contains("unknown entity '&nbsp;'"));
    }

    #[test]
    fn test_decode_reader_rejects_invalid_utf8() {
        let err = Decoder::new().decode_reader(&[b'<', 0xff, b'>'][..]).unwrap_err();
        assert!(err.to_string().starts_with("input is not valid UTF-8"));
    }

    #[test]
    fn test_text_and_children_together() {
        let tree = decode("<a>lead<b/>tail</a>").unwrap();
        let root = tree.root().unwrap();
        assert_eq!(root.text.as_deref(), Some("leadtail"));
        assert_eq!(root.children.len(), 1);
    }
}
