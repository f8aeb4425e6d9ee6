//! Error taxonomy shared by the extraction, decoding and emitting stages

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open the input file '{path}'")]
    InputOpen { path: PathBuf, source: io::Error },

    #[error("not an APK file")]
    ArchiveOpen {
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{member} is not found in APK")]
    MemberNotFound { member: String },

    #[error("failed to open {member} in APK")]
    MemberOpen {
        member: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to read file {member} in APK")]
    MemberRead { member: String, source: io::Error },

    #[error("{0}")]
    Decode(String),

    #[error("failed to write output to {target}")]
    OutputWrite { target: String, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Build a decode error from anything printable
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
