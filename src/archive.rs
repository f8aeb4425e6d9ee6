//! Archive member extraction
//!
//! An APK is a zip container. Extraction follows a fixed lifecycle:
//! open archive, locate member, open member, read it fully, close member,
//! close archive. [`ArchiveHandle`] and [`MemberCursor`] own the two open
//! resources and release them when dropped, so every early return through
//! `?` closes whatever was opened, exactly once, in reverse order.

use crate::error::{Error, Result};
use log::{debug, warn};
use std::fs;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Member decoded when the caller names none
pub const DEFAULT_ENTRY: &str = "AndroidManifest.xml";

/// Bytes requested from the member per read call
pub const CHUNK_SIZE: usize = 1 << 15;

/// Upper bound on the up-front reservation taken from archive metadata
pub const MAX_PREALLOCATION: u64 = 64 << 20;

/// Extraction tunables
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Size of each read from the decompressing member reader
    pub chunk_size: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// An open archive; closed on drop
pub struct ArchiveHandle<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> ArchiveHandle<R> {
    /// Parse the archive directory from `reader`
    pub fn open(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader).map_err(|source| Error::ArchiveOpen { source })?;
        debug!("opened archive with {} entries", archive.len());
        Ok(Self { archive })
    }

    /// Number of members in the archive
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Locate `member` and open it for reading.
    ///
    /// The cursor borrows the handle, so the archive cannot be closed while
    /// the member is still open.
    pub fn open_member(&mut self, member: &str) -> Result<MemberCursor<'_>> {
        let file = match self.archive.by_name(member) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(Error::MemberNotFound {
                    member: member.to_string(),
                })
            }
            Err(source) => {
                return Err(Error::MemberOpen {
                    member: member.to_string(),
                    source,
                })
            }
        };

        let declared_size = file.size();
        debug!("opened member {member} ({declared_size} bytes declared)");

        Ok(MemberCursor {
            member: member.to_string(),
            declared_size,
            reader: Box::new(file),
        })
    }
}

impl<R: Read + Seek> Drop for ArchiveHandle<R> {
    fn drop(&mut self) {
        debug!("closed archive");
    }
}

/// An open member of an [`ArchiveHandle`]; closed on drop
pub struct MemberCursor<'a> {
    member: String,
    declared_size: u64,
    reader: Box<dyn Read + 'a>,
}

impl MemberCursor<'_> {
    /// Uncompressed size as recorded in the archive metadata
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn name(&self) -> &str {
        &self.member
    }

    /// Read the whole member, `chunk_size` bytes at a time.
    ///
    /// The declared size only sizes the initial reservation; the buffer grows
    /// if the member turns out to be larger.
    pub fn read_to_end(mut self, chunk_size: usize) -> Result<Vec<u8>> {
        let chunk_size = chunk_size.max(1);
        let mut content = Vec::with_capacity(self.declared_size.min(MAX_PREALLOCATION) as usize);
        let mut filled = 0;

        loop {
            content.resize(filled + chunk_size, 0);
            match self.reader.read(&mut content[filled..]) {
                Ok(0) => break,
                Ok(len) => filled += len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(Error::MemberRead {
                        member: self.member.clone(),
                        source,
                    })
                }
            }
        }
        content.truncate(filled);

        if content.len() as u64 != self.declared_size {
            warn!(
                "member {} declared {} bytes but yielded {}",
                self.member,
                self.declared_size,
                content.len()
            );
        }

        Ok(content)
    }
}

impl Drop for MemberCursor<'_> {
    fn drop(&mut self) {
        debug!("closed member {}", self.member);
    }
}

/// Pulls a single named member out of a zip container
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractConfig,
}

impl Extractor {
    /// Create an extractor with the default chunk size
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Open the archive at `path` and return the contents of `member`
    pub fn extract(&self, path: &Path, member: &str) -> Result<Vec<u8>> {
        let file = fs::File::open(path).map_err(|e| Error::ArchiveOpen { source: e.into() })?;
        debug!("extracting {member} from {}", path.display());
        self.extract_from_reader(BufReader::new(file), member)
    }

    /// Same as [`Extractor::extract`] for an archive that is already open
    pub fn extract_from_reader<R: Read + Seek>(&self, reader: R, member: &str) -> Result<Vec<u8>> {
        let mut archive = ArchiveHandle::open(reader)?;
        let cursor = archive.open_member(member)?;
        let content = cursor.read_to_end(self.config.chunk_size)?;
        Ok(content)
    }
}

/// Extract `member` from the archive at `path` with default settings
pub fn extract(path: &Path, member: &str) -> Result<Vec<u8>> {
    Extractor::new().extract(path, member)
}
