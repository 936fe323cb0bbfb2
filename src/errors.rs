use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MdError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{}: {source}", .path.display())]
    IoPath { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error("{0}")]
    Nom(String),

    #[error("invalid magic expected: {expected} but got: {actual}")]
    InvalidMagic { expected: u8, actual: u8 },

    #[error("unsupported header version {0} - only header version 1 is supported")]
    UnsupportedHeaderVersion(u8),

    #[error("invalid lead: {0}")]
    InvalidLead(&'static str),

    #[error("invalid tag data type in store {store_type}: expected 0 - 9 but got {raw_data_type}")]
    InvalidTagDataType {
        raw_data_type: u32,
        store_type: &'static str,
    },

    #[error("unable to find tag {0}")]
    TagNotFound(String),

    #[error("tag {tag} has data type {actual_data_type}, not {expected_data_type}")]
    UnexpectedTagDataType {
        expected_data_type: &'static str,
        actual_data_type: String,
        tag: String,
    },

    #[error("{}: archive error: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("unsupported compressor {0}")]
    UnsupportedCompressor(String),

    #[error(transparent)]
    XmlParse(#[from] quick_xml::Error),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("{}: {reason}", .path.display())]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("digests from content did not match those in the header")]
    DigestMismatch,

    #[error("no rpm packages found in {}", .0.display())]
    NoPackages(PathBuf),
}

impl MdError {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        MdError::IoPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn archive(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        MdError::Archive {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn metadata(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        MdError::InvalidMetadata {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl From<nom::Err<(&[u8], nom::error::ErrorKind)>> for MdError {
    fn from(error: nom::Err<(&[u8], nom::error::ErrorKind)>) -> Self {
        match error {
            nom::Err::Error((_, kind)) | nom::Err::Failure((_, kind)) => {
                MdError::Nom(kind.description().to_string())
            }
            nom::Err::Incomplete(_) => MdError::Nom("unhandled incomplete".to_string()),
        }
    }
}
