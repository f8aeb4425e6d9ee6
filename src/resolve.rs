//! Input classification and dispatch
//!
//! The first byte of the input decides how it is decoded:
//!
//! | first byte    | treated as  | path                                         |
//! |---------------|-------------|----------------------------------------------|
//! | `P` (0x50)    | zip / APK   | extract member, decode it as binary XML      |
//! | 0x03          | binary XML  | decode the stream directly                   |
//! | anything else | text XML    | parse the stream, trimming whitespace        |
//!
//! The byte is inspected with [`BufRead::fill_buf`], which leaves it in the
//! buffer for whichever decoder ends up reading the stream.

use crate::archive::Extractor;
use crate::axml::{AxmlDecoder, AXML_MAGIC};
use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::stream::MemoryStream;
use crate::tree::Tree;
use log::debug;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

/// First byte of a zip local file header (`PK\x03\x04`)
pub const ARCHIVE_MAGIC: u8 = b'P';

/// Encoding of an input, decided from its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Archive,
    BinaryXml,
    TextXml,
}

impl Format {
    /// Classify by first byte; end of stream counts as text
    pub fn sniff(first: Option<u8>) -> Self {
        match first {
            Some(ARCHIVE_MAGIC) => Self::Archive,
            Some(AXML_MAGIC) => Self::BinaryXml,
            _ => Self::TextXml,
        }
    }

    /// Peek at `reader` without consuming anything
    pub fn detect<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let buf = reader.fill_buf()?;
        Ok(Self::sniff(buf.first().copied()))
    }
}

/// Where the raw input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    Path(PathBuf),
}

impl InputSource {
    /// `None`, an empty path or `-` select standard input
    pub fn from_arg(arg: Option<PathBuf>) -> Self {
        match arg {
            Some(path) if path.as_os_str() != "-" && !path.as_os_str().is_empty() => {
                Self::Path(path)
            }
            _ => Self::Stdin,
        }
    }
}

/// Something that turns a byte stream into a [`Tree`]
pub trait TreeDecoder {
    fn decode_stream(&self, reader: &mut dyn BufRead) -> Result<Tree>;

    /// Decode a document that is already in memory
    fn decode_bytes(&self, data: &[u8]) -> Result<Tree> {
        self.decode_stream(&mut &data[..])
    }
}

impl TreeDecoder for AxmlDecoder {
    fn decode_stream(&self, reader: &mut dyn BufRead) -> Result<Tree> {
        self.decode_reader(reader)
    }

    fn decode_bytes(&self, data: &[u8]) -> Result<Tree> {
        self.decode(data)
    }
}

impl TreeDecoder for Decoder {
    fn decode_stream(&self, reader: &mut dyn BufRead) -> Result<Tree> {
        self.decode_reader(reader)
    }
}

/// Routes an input to the right decoder
pub struct Resolver {
    binary: Box<dyn TreeDecoder>,
    text: Box<dyn TreeDecoder>,
    extractor: Extractor,
}

impl Resolver {
    /// Binary XML and text XML decoders with default extraction settings
    pub fn new() -> Self {
        Self::with_decoders(AxmlDecoder::new(), Decoder::new())
    }

    /// Use custom decoders for the binary and text paths
    pub fn with_decoders(
        binary: impl TreeDecoder + 'static,
        text: impl TreeDecoder + 'static,
    ) -> Self {
        Self {
            binary: Box::new(binary),
            text: Box::new(text),
            extractor: Extractor::new(),
        }
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Decode `input`, extracting `member` first if it is an archive
    pub fn resolve(&self, input: &InputSource, member: &str) -> Result<Tree> {
        match input {
            InputSource::Stdin => {
                // Rust never translates line endings on standard input, so the
                // first byte is exactly what the producer wrote
                let stdin = io::stdin();
                self.resolve_reader(stdin.lock(), member)
            }
            InputSource::Path(path) => {
                let file = fs::File::open(path).map_err(|source| Error::InputOpen {
                    path: path.clone(),
                    source,
                })?;
                let mut reader = BufReader::new(file);
                let format = Format::detect(&mut reader)?;
                debug!("{} classified as {format:?}", path.display());

                match format {
                    Format::Archive => {
                        drop(reader);
                        let content = self.extractor.extract(path, member)?;
                        self.decode_member(content)
                    }
                    Format::BinaryXml => self.binary.decode_stream(&mut reader),
                    Format::TextXml => self.text.decode_stream(&mut reader),
                }
            }
        }
    }

    /// Decode a stream that cannot be reopened.
    ///
    /// An archive is buffered in memory in full before extraction, since the
    /// zip directory lives at the end of the file.
    pub fn resolve_reader<R: BufRead>(&self, mut reader: R, member: &str) -> Result<Tree> {
        let format = Format::detect(&mut reader)?;
        debug!("input stream classified as {format:?}");

        match format {
            Format::Archive => {
                let mut archive = Vec::new();
                reader.read_to_end(&mut archive)?;
                let content = self
                    .extractor
                    .extract_from_reader(MemoryStream::new(archive), member)?;
                self.decode_member(content)
            }
            Format::BinaryXml => self.binary.decode_stream(&mut reader),
            Format::TextXml => self.text.decode_stream(&mut reader),
        }
    }

    /// The decoder borrows the extracted bytes in place
    fn decode_member(&self, content: Vec<u8>) -> Result<Tree> {
        let stream = MemoryStream::new(content);
        self.binary.decode_bytes(stream.remaining())
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode `input` with the default decoders
pub fn resolve(input: &InputSource, member: &str) -> Result<Tree> {
    Resolver::new().resolve(input, member)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DEFAULT_ENTRY;
    use crate::axml::fixture;
    use crate::tree::Node;
    use std::cell::RefCell;
    use std::io::{Cursor, Read, Write};
    use std::rc::Rc;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Records every stream it is handed and returns a fixed tree
    #[derive(Clone)]
    struct StubDecoder {
        tag: &'static str,
        seen: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl StubDecoder {
        fn new(tag: &'static str) -> Self {
            Self {
                tag,
                seen: Rc::default(),
            }
        }

        fn calls(&self) -> Vec<Vec<u8>> {
            self.seen.borrow().clone()
        }
    }

    impl TreeDecoder for StubDecoder {
        fn decode_stream(&self, reader: &mut dyn BufRead) -> Result<Tree> {
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            self.seen.borrow_mut().push(data);
            Ok(Tree::with_root(Node::new(self.tag)))
        }
    }

    fn stub_resolver() -> (Resolver, StubDecoder, StubDecoder) {
        let binary = StubDecoder::new("binary");
        let text = StubDecoder::new("text");
        let resolver = Resolver::with_decoders(binary.clone(), text.clone());
        (resolver, binary, text)
    }

    fn apk(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_sniff() {
        assert_eq!(Format::sniff(Some(0x50)), Format::Archive);
        assert_eq!(Format::sniff(Some(0x03)), Format::BinaryXml);
        assert_eq!(Format::sniff(Some(b'<')), Format::TextXml);
        assert_eq!(Format::sniff(Some(0x00)), Format::TextXml);
        assert_eq!(Format::sniff(None), Format::TextXml);
    }

    #[test]
    fn test_detect_does_not_consume() {
        let mut reader = MemoryStream::new(vec![0x03, 0x00, 0x08]);
        assert_eq!(Format::detect(&mut reader).unwrap(), Format::BinaryXml);
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_binary_routed_with_first_byte_intact() {
        let (resolver, binary, text) = stub_resolver();
        let input = vec![0x03, 0x00, 0x08, 0x00];
        let tree = resolver.resolve_reader(&input[..], DEFAULT_ENTRY).unwrap();

        assert_eq!(tree.root().unwrap().name, "binary");
        assert_eq!(binary.calls(), vec![input]);
        assert!(text.calls().is_empty());
    }

    #[test]
    fn test_text_routed_with_first_byte_intact() {
        let (resolver, binary, text) = stub_resolver();
        let tree = resolver.resolve_reader(&b"<a/>"[..], DEFAULT_ENTRY).unwrap();

        assert_eq!(tree.root().unwrap().name, "text");
        assert_eq!(text.calls(), vec![b"<a/>".to_vec()]);
        assert!(binary.calls().is_empty());
    }

    #[test]
    fn test_archive_member_goes_to_binary_decoder() {
        let (resolver, binary, text) = stub_resolver();
        let member = vec![0x03, 0x00, 0x08, 0x00, 0xAA];
        let data = apk(&[("classes.dex", b"dex"), (DEFAULT_ENTRY, &member)]);

        let tree = resolver.resolve_reader(&data[..], DEFAULT_ENTRY).unwrap();
        assert_eq!(tree.root().unwrap().name, "binary");
        assert_eq!(binary.calls(), vec![member]);
        assert!(text.calls().is_empty());
    }

    #[test]
    fn test_empty_input_fails_in_text_parser() {
        let (resolver, binary, text) = stub_resolver();
        resolver.resolve_reader(&b""[..], DEFAULT_ENTRY).unwrap();
        assert_eq!(text.calls(), vec![Vec::<u8>::new()]);
        assert!(binary.calls().is_empty());

        let err = Resolver::new()
            .resolve_reader(&b""[..], DEFAULT_ENTRY)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.to_string(), "line 1: expected element");
    }

    #[test]
    fn test_archive_missing_member() {
        let data = apk(&[(DEFAULT_ENTRY, b"\x03")]);
        let err = Resolver::new()
            .resolve_reader(&data[..], "entry.xml")
            .unwrap_err();
        assert!(matches!(err, Error::MemberNotFound { .. }));
    }

    #[test]
    fn test_resolve_path_all_formats() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = fixture::manifest();

        let apk_path = dir.path().join("app.apk");
        fs::write(&apk_path, apk(&[(DEFAULT_ENTRY, &manifest)])).unwrap();
        let axml_path = dir.path().join("AndroidManifest.xml");
        fs::write(&axml_path, &manifest).unwrap();

        let from_apk = resolve(&InputSource::Path(apk_path), DEFAULT_ENTRY).unwrap();
        let from_axml = resolve(&InputSource::Path(axml_path), DEFAULT_ENTRY).unwrap();
        assert_eq!(from_apk, from_axml);
        assert_eq!(from_apk.root().unwrap().name, "manifest");

        let xml_path = dir.path().join("plain.xml");
        fs::write(&xml_path, "<a>\n  <b/>\n</a>\n").unwrap();
        let from_xml = resolve(&InputSource::Path(xml_path), DEFAULT_ENTRY).unwrap();
        assert_eq!(from_xml, Tree::with_root(Node::new("a").with_child(Node::new("b"))));
    }

    #[test]
    fn test_resolve_missing_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(&InputSource::Path(dir.path().join("nope")), DEFAULT_ENTRY).unwrap_err();
        assert!(matches!(err, Error::InputOpen { .. }));
    }

    #[test]
    fn test_input_source_from_arg() {
        assert_eq!(InputSource::from_arg(None), InputSource::Stdin);
        assert_eq!(InputSource::from_arg(Some("".into())), InputSource::Stdin);
        assert_eq!(InputSource::from_arg(Some("-".into())), InputSource::Stdin);
        assert_eq!(
            InputSource::from_arg(Some("app.apk".into())),
            InputSource::Path("app.apk".into())
        );
    }
}
