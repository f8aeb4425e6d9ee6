//! # axmldec
//!
//! Decode Android binary XML, either on its own or straight out of an APK,
//! and print it as indented text XML.
//!
//! ## Inputs
//!
//! One input is accepted and its encoding is recognised from the first byte:
//!
//! - **APK / zip** (`P`): the named member (default `AndroidManifest.xml`) is
//!   extracted into memory and decoded as binary XML
//! - **Binary XML** (`0x03`): decoded directly
//! - **Text XML** (anything else): parsed, with surrounding whitespace of
//!   each element's text trimmed
//!
//! All three paths produce the same [`Tree`], which [`Encoder`] writes with a
//! two-space indent. Feeding that output back in is stable: decoding and
//! re-encoding gives identical bytes.
//!
//! ## Resource handling
//!
//! Archive access goes through [`ArchiveHandle`] and [`MemberCursor`], which
//! close themselves when dropped. Whatever step of an extraction fails, the
//! member and the archive are each closed exactly once before the error
//! reaches the caller.
//!
//! ```no_run
//! use axmldec::{resolve, Destination, Encoder, InputSource, DEFAULT_ENTRY};
//!
//! fn main() -> axmldec::Result<()> {
//!     let input = InputSource::Path("app.apk".into());
//!     let tree = resolve(&input, DEFAULT_ENTRY)?;
//!     Encoder::new().emit(&tree, &Destination::Stdout)
//! }
//! ```

pub mod archive;
pub mod axml;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod resolve;
pub mod stream;
pub mod tree;

pub use archive::{
    extract, ArchiveHandle, ExtractConfig, Extractor, MemberCursor, CHUNK_SIZE, DEFAULT_ENTRY,
};
pub use axml::{AxmlDecoder, AXML_MAGIC};
pub use decoder::Decoder;
pub use encoder::{Destination, Encoder};
pub use error::{Error, Result};
pub use resolve::{resolve, Format, InputSource, Resolver, TreeDecoder, ARCHIVE_MAGIC};
pub use stream::MemoryStream;
pub use tree::{Node, Tree, MAX_DEPTH};
