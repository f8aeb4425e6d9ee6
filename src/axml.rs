//! Android binary XML decoder
//!
//! Compiled resources (`AndroidManifest.xml` inside an APK, layouts, ...) are
//! a sequence of little-endian chunks:
//!
//! ```text
//! RES_XML_TYPE header { type: u16, header_size: u16, size: u32 }
//!   RES_STRING_POOL_TYPE          every name and string value
//!   RES_XML_RESOURCE_MAP_TYPE     attribute resource ids (ignored)
//!   RES_XML_START_NAMESPACE_TYPE  prefix/uri binding
//!   RES_XML_START_ELEMENT_TYPE    element name and attributes
//!   RES_XML_CDATA_TYPE            character data
//!   RES_XML_END_ELEMENT_TYPE
//!   RES_XML_END_NAMESPACE_TYPE
//! ```
//!
//! The decoder pull-parses the chunks into a [`Tree`]. Every read is bounds
//! checked, so truncated or hostile input produces [`Error::Decode`].

use crate::error::{Error, Result};
use crate::tree::{Node, Tree, MAX_DEPTH};
use std::io::Read;

/// First byte of every binary XML document (low byte of `RES_XML_TYPE`)
pub const AXML_MAGIC: u8 = 0x03;

const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_TYPE: u16 = 0x0003;
const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
const RES_XML_CDATA_TYPE: u16 = 0x0104;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

const CHUNK_HEADER_SIZE: usize = 8;
const ATTRIBUTE_MIN_SIZE: usize = 20;
const UTF8_FLAG: u32 = 1 << 8;
const NO_INDEX: u32 = 0xffff_ffff;

// Res_value data types
const TYPE_NULL: u8 = 0x00;
const TYPE_REFERENCE: u8 = 0x01;
const TYPE_ATTRIBUTE: u8 = 0x02;
const TYPE_STRING: u8 = 0x03;
const TYPE_FLOAT: u8 = 0x04;
const TYPE_DIMENSION: u8 = 0x05;
const TYPE_FRACTION: u8 = 0x06;
const TYPE_DYNAMIC_REFERENCE: u8 = 0x07;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;
const TYPE_INT_COLOR_ARGB8: u8 = 0x1c;
const TYPE_INT_COLOR_RGB8: u8 = 0x1d;
const TYPE_INT_COLOR_ARGB4: u8 = 0x1e;
const TYPE_INT_COLOR_RGB4: u8 = 0x1f;

const DIMENSION_UNITS: [&str; 6] = ["px", "dip", "sp", "pt", "in", "mm"];
const FRACTION_UNITS: [&str; 2] = ["%", "%p"];

/// Little-endian cursor over a byte slice
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::decode(format!("unexpected end of data at offset {}", self.pos)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[derive(Debug, Clone, Copy)]
struct ChunkHeader {
    kind: u16,
    header_size: u16,
    size: u32,
}

impl ChunkHeader {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            kind: reader.u16()?,
            header_size: reader.u16()?,
            size: reader.u32()?,
        })
    }
}

/// Typed attribute value (`Res_value`)
#[derive(Debug, Clone, Copy)]
struct ResValue {
    data_type: u8,
    data: u32,
}

impl ResValue {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let _size = reader.u16()?;
        let _res0 = reader.u8()?;
        Ok(Self {
            data_type: reader.u8()?,
            data: reader.u32()?,
        })
    }
}

/// Decodes Android binary XML into a [`Tree`]
#[derive(Debug, Clone, Default)]
pub struct AxmlDecoder {}

impl AxmlDecoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Decode a complete document held in memory
    pub fn decode(&self, data: &[u8]) -> Result<Tree> {
        Parser::new(data).parse()
    }

    /// Read `reader` to the end and decode it
    pub fn decode_reader<R: Read>(&self, mut reader: R) -> Result<Tree> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.decode(&data)
    }
}

struct Parser<'a> {
    data: &'a [u8],
    strings: Vec<String>,
    /// Elements opened but not yet closed
    open: Vec<Node>,
    /// Namespace bindings as (uri, prefix) string indices. Entry 0 is the
    /// document scope, entry i + 1 belongs to `open[i]`.
    scopes: Vec<Vec<(u32, u32)>>,
    roots: Vec<Node>,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            strings: Vec::new(),
            open: Vec::new(),
            scopes: vec![Vec::new()],
            roots: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Tree> {
        let mut reader = ByteReader::at(self.data, 0);
        let header = ChunkHeader::read(&mut reader)
            .map_err(|_| Error::decode("not a binary XML file"))?;
        if header.kind != RES_XML_TYPE {
            return Err(Error::decode("not a binary XML file"));
        }

        let end = (header.size as usize).min(self.data.len());
        let mut pos = header.header_size.max(CHUNK_HEADER_SIZE as u16) as usize;

        while pos < end {
            let chunk = ChunkHeader::read(&mut ByteReader::at(self.data, pos))?;
            if (chunk.size as usize) < CHUNK_HEADER_SIZE {
                return Err(Error::decode(format!(
                    "invalid chunk size {} at offset {pos}",
                    chunk.size
                )));
            }

            match chunk.kind {
                RES_STRING_POOL_TYPE => self.parse_string_pool(pos, chunk)?,
                RES_XML_RESOURCE_MAP_TYPE => {}
                RES_XML_START_NAMESPACE_TYPE => self.parse_start_namespace(pos, chunk)?,
                RES_XML_END_NAMESPACE_TYPE => self.parse_end_namespace(),
                RES_XML_START_ELEMENT_TYPE => self.parse_start_element(pos, chunk)?,
                RES_XML_END_ELEMENT_TYPE => self.parse_end_element()?,
                RES_XML_CDATA_TYPE => self.parse_cdata(pos, chunk)?,
                other => {
                    return Err(Error::decode(format!("unknown chunk type 0x{other:x}")));
                }
            }

            pos += chunk.size as usize;
        }

        // Elements left open by a truncated document are kept
        while !self.open.is_empty() {
            self.parse_end_element()?;
        }

        Ok(Tree { roots: self.roots })
    }

    fn string(&self, index: u32) -> Result<&str> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::decode(format!("string index {index} out of range")))
    }

    fn parse_string_pool(&mut self, start: usize, chunk: ChunkHeader) -> Result<()> {
        let mut reader = ByteReader::at(self.data, start + CHUNK_HEADER_SIZE);
        let string_count = reader.u32()? as usize;
        let _style_count = reader.u32()?;
        let flags = reader.u32()?;
        let strings_start = reader.u32()? as usize;
        let _styles_start = reader.u32()?;
        let utf8 = flags & UTF8_FLAG != 0;

        let mut reader = ByteReader::at(self.data, start + chunk.header_size as usize);
        let mut offsets = Vec::with_capacity(string_count.min(self.data.len() / 4));
        for _ in 0..string_count {
            offsets.push(reader.u32()? as usize);
        }

        // Style spans only carry rich-text formatting and are not rendered
        self.strings.clear();
        self.strings.reserve(offsets.len());
        for offset in offsets {
            let mut reader = ByteReader::at(self.data, start + strings_start + offset);
            let string = if utf8 {
                read_utf8_string(&mut reader)?
            } else {
                read_utf16_string(&mut reader)?
            };
            self.strings.push(string);
        }

        Ok(())
    }

    fn parse_start_namespace(&mut self, start: usize, chunk: ChunkHeader) -> Result<()> {
        let mut reader = ByteReader::at(self.data, start + chunk.header_size as usize);
        let prefix = reader.u32()?;
        let uri = reader.u32()?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((uri, prefix));
        }
        Ok(())
    }

    fn parse_end_namespace(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.pop();
        }
    }

    fn parse_start_element(&mut self, start: usize, chunk: ChunkHeader) -> Result<()> {
        let ext_start = start + chunk.header_size as usize;
        let mut reader = ByteReader::at(self.data, ext_start);
        let _ns = reader.u32()?;
        let name = reader.u32()?;
        let attribute_start = reader.u16()? as usize;
        let attribute_size = reader.u16()? as usize;
        let attribute_count = reader.u16()? as usize;

        if attribute_count > 0 && attribute_size < ATTRIBUTE_MIN_SIZE {
            return Err(Error::decode(format!(
                "invalid attribute size {attribute_size}"
            )));
        }

        if self.open.len() >= MAX_DEPTH {
            return Err(Error::decode(format!(
                "elements nested deeper than {MAX_DEPTH} levels"
            )));
        }

        let mut node = Node::new(self.string(name)?);

        // Namespaces started in the enclosing scope are declared here
        if let Some(scope) = self.scopes.last() {
            for &(uri, prefix) in scope {
                node.attributes.push((
                    format!("xmlns:{}", self.string(prefix)?),
                    self.string(uri)?.to_string(),
                ));
            }
        }

        for i in 0..attribute_count {
            let mut reader =
                ByteReader::at(self.data, ext_start + attribute_start + i * attribute_size);
            let ns = reader.u32()?;
            let attr_name = reader.u32()?;
            let raw_value = reader.u32()?;
            let typed_value = ResValue::read(&mut reader)?;

            let mut key = String::new();
            if ns != NO_INDEX {
                if let Some(prefix) = self.lookup_prefix(ns) {
                    key.push_str(self.string(prefix)?);
                    key.push(':');
                }
            }
            key.push_str(self.string(attr_name)?);

            let value = if raw_value != NO_INDEX {
                self.string(raw_value)?.to_string()
            } else {
                self.format_value(typed_value)?
            };
            node.attributes.push((key, value));
        }

        self.open.push(node);
        self.scopes.push(Vec::new());
        Ok(())
    }

    fn parse_end_element(&mut self) -> Result<()> {
        let node = self
            .open
            .pop()
            .ok_or_else(|| Error::decode("end element without matching start element"))?;
        self.scopes.pop();

        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
        Ok(())
    }

    fn parse_cdata(&mut self, start: usize, chunk: ChunkHeader) -> Result<()> {
        let mut reader = ByteReader::at(self.data, start + chunk.header_size as usize);
        let index = reader.u32()?;
        let text = self.string(index)?.trim().to_string();
        if text.is_empty() {
            return Ok(());
        }
        if let Some(node) = self.open.last_mut() {
            node.push_text(&text);
        }
        Ok(())
    }

    /// Find the innermost prefix bound to `uri`. The last scope holds the
    /// bindings declared on the element currently being built.
    fn lookup_prefix(&self, uri: u32) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(bound, _)| *bound == uri)
            .map(|&(_, prefix)| prefix)
    }

    fn format_value(&self, value: ResValue) -> Result<String> {
        let data = value.data;
        let text = match value.data_type {
            TYPE_NULL => "null".to_string(),
            TYPE_REFERENCE | TYPE_DYNAMIC_REFERENCE if data == 0 => "@null".to_string(),
            TYPE_REFERENCE | TYPE_DYNAMIC_REFERENCE => format!("@0x{data:08x}"),
            TYPE_ATTRIBUTE => format!("?0x{data:08x}"),
            TYPE_STRING => self.string(data)?.to_string(),
            TYPE_FLOAT => f32::from_bits(data).to_string(),
            TYPE_DIMENSION => {
                let unit = DIMENSION_UNITS.get((data & 0xf) as usize).unwrap_or(&"");
                format!("{}{unit}", complex_to_float(data))
            }
            TYPE_FRACTION => {
                let unit = FRACTION_UNITS.get((data & 0xf) as usize).unwrap_or(&"");
                format!("{}{unit}", complex_to_float(data) * 100.0)
            }
            TYPE_INT_DEC => (data as i32).to_string(),
            TYPE_INT_HEX => format!("0x{data:x}"),
            TYPE_INT_BOOLEAN => (data != 0).to_string(),
            TYPE_INT_COLOR_ARGB8 | TYPE_INT_COLOR_ARGB4 => format!("#{data:08x}"),
            TYPE_INT_COLOR_RGB8 | TYPE_INT_COLOR_RGB4 => format!("#{:06x}", data & 0x00ff_ffff),
            other => format!("type{other}/{data}"),
        };
        Ok(text)
    }
}

/// Decode a `Res_value` complex number (dimension or fraction mantissa)
fn complex_to_float(data: u32) -> f32 {
    const MANTISSA_MULT: f32 = 1.0 / (1 << 8) as f32;
    const RADIX_MULTS: [f32; 4] = [
        MANTISSA_MULT,
        MANTISSA_MULT / (1 << 7) as f32,
        MANTISSA_MULT / (1 << 15) as f32,
        MANTISSA_MULT / (1 << 23) as f32,
    ];
    (data & 0xffff_ff00) as i32 as f32 * RADIX_MULTS[((data >> 4) & 0x3) as usize]
}

/// Length prefix of a UTF-8 pool string: one byte, or two with the high bit set
fn read_utf8_length(reader: &mut ByteReader<'_>) -> Result<usize> {
    let first = reader.u8()? as usize;
    if first & 0x80 != 0 {
        Ok(((first & 0x7f) << 8) | reader.u8()? as usize)
    } else {
        Ok(first)
    }
}

fn read_utf8_string(reader: &mut ByteReader<'_>) -> Result<String> {
    let _char_len = read_utf8_length(reader)?;
    let byte_len = read_utf8_length(reader)?;
    let bytes = reader.bytes(byte_len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_utf16_string(reader: &mut ByteReader<'_>) -> Result<String> {
    let mut len = reader.u16()? as usize;
    if len & 0x8000 != 0 {
        len = ((len & 0x7fff) << 16) | reader.u16()? as usize;
    }

    let mut units = Vec::with_capacity(len.min(reader.data.len() / 2));
    for _ in 0..len {
        units.push(reader.u16()?);
    }
    if reader.u16()? != 0 {
        return Err(Error::decode("invalid UTF-16 string"));
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Builders for hand-assembled binary XML used by tests across the crate
#[cfg(test)]
pub(crate) mod fixture {
    use super::*;

    pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

    pub fn chunk(kind: u16, header_size: u16, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&header_size.to_le_bytes());
        out.extend_from_slice(&((CHUNK_HEADER_SIZE + body.len()) as u32).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn u32s(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn string_pool_utf16(strings: &[&str]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(data.len() as u32);
            let units: Vec<u16> = s.encode_utf16().collect();
            data.extend_from_slice(&(units.len() as u16).to_le_bytes());
            for unit in units {
                data.extend_from_slice(&unit.to_le_bytes());
            }
            data.extend_from_slice(&0u16.to_le_bytes());
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }
        string_pool(strings.len(), 0, &offsets, &data)
    }

    pub fn string_pool_utf8(strings: &[&str]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(data.len() as u32);
            data.push(s.chars().count() as u8);
            data.push(s.len() as u8);
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }
        string_pool(strings.len(), UTF8_FLAG, &offsets, &data)
    }

    fn string_pool(count: usize, flags: u32, offsets: &[u32], data: &[u8]) -> Vec<u8> {
        let strings_start = 28 + 4 * count as u32;
        let mut body = u32s(&[count as u32, 0, flags, strings_start, 0]);
        body.extend(u32s(offsets));
        body.extend_from_slice(data);
        chunk(RES_STRING_POOL_TYPE, 28, &body)
    }

    pub fn start_namespace(prefix: u32, uri: u32) -> Vec<u8> {
        chunk(RES_XML_START_NAMESPACE_TYPE, 16, &u32s(&[1, NO_INDEX, prefix, uri]))
    }

    pub fn end_namespace(prefix: u32, uri: u32) -> Vec<u8> {
        chunk(RES_XML_END_NAMESPACE_TYPE, 16, &u32s(&[1, NO_INDEX, prefix, uri]))
    }

    /// `attributes` are (ns, name, raw value, data type, data)
    pub fn start_element(name: u32, attributes: &[(u32, u32, u32, u8, u32)]) -> Vec<u8> {
        let mut body = u32s(&[1, NO_INDEX, NO_INDEX, name]);
        for v in [20u16, 20, attributes.len() as u16, 0, 0, 0] {
            body.extend_from_slice(&v.to_le_bytes());
        }
        for &(ns, attr_name, raw, data_type, data) in attributes {
            body.extend(u32s(&[ns, attr_name, raw]));
            body.extend_from_slice(&8u16.to_le_bytes());
            body.push(0);
            body.push(data_type);
            body.extend_from_slice(&data.to_le_bytes());
        }
        chunk(RES_XML_START_ELEMENT_TYPE, 16, &body)
    }

    pub fn end_element(name: u32) -> Vec<u8> {
        chunk(RES_XML_END_ELEMENT_TYPE, 16, &u32s(&[1, NO_INDEX, NO_INDEX, name]))
    }

    pub fn cdata(index: u32) -> Vec<u8> {
        let mut body = u32s(&[1, NO_INDEX, index]);
        body.extend_from_slice(&8u16.to_le_bytes());
        body.push(0);
        body.push(TYPE_STRING);
        body.extend_from_slice(&index.to_le_bytes());
        chunk(RES_XML_CDATA_TYPE, 16, &body)
    }

    pub fn document(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        chunk(RES_XML_TYPE, 8, &body)
    }

    /// A small manifest:
    ///
    /// ```xml
    /// <manifest xmlns:android="..." package="com.example" android:versionCode="7">
    ///   <application android:debuggable="true" android:label="@0x7f040000"/>
    /// </manifest>
    /// ```
    pub fn manifest() -> Vec<u8> {
        let strings = [
            "android",
            ANDROID_NS,
            "manifest",
            "package",
            "com.example",
            "versionCode",
            "application",
            "debuggable",
            "label",
        ];
        document(&[
            string_pool_utf16(&strings),
            start_namespace(0, 1),
            start_element(
                2,
                &[
                    (NO_INDEX, 3, 4, TYPE_STRING, 4),
                    (1, 5, NO_INDEX, TYPE_INT_DEC, 7),
                ],
            ),
            start_element(
                6,
                &[
                    (1, 7, NO_INDEX, TYPE_INT_BOOLEAN, NO_INDEX),
                    (1, 8, NO_INDEX, TYPE_REFERENCE, 0x7f04_0000),
                ],
            ),
            end_element(6),
            end_element(2),
            end_namespace(0, 1),
        ])
    }
}
