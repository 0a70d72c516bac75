//! Error types for the smolidx index.

use std::fmt;
use std::io;

/// The result type used throughout smolidx.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for index build and scan operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred in a page store or spill file.
    Io(io::Error),

    /// The schema or an input value cannot be indexed (key type, column
    /// count, oversized text, NULL values).
    UnsupportedSchema(String),

    /// A single row does not fit on an empty page in any encoding.
    Capacity(String),

    /// The caller violated the scan contract (row-returning scans,
    /// `IS NULL` searches).
    Usage(String),

    /// Data corruption was detected while decoding a page.
    Corruption(String),

    /// A page checksum did not match its contents.
    ChecksumMismatch {
        /// The checksum stored in the page trailer.
        expected: u32,
        /// The checksum computed over the page bytes.
        actual: u32,
    },

    /// An invalid argument or option value was provided.
    InvalidArgument(String),

    /// A spill record could not be serialized or deserialized.
    Serialization(String),

    /// The index is read-only once built.
    ReadOnly(String),

    /// An internal error occurred.
    Internal(String),
}

impl Error {
    /// Creates a new unsupported-schema error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedSchema(msg.into())
    }

    /// Creates a new capacity error.
    pub fn capacity(msg: impl Into<String>) -> Self {
        Error::Capacity(msg.into())
    }

    /// Creates a new usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Returns true for errors raised by page decoding guards.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ChecksumMismatch { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::UnsupportedSchema(msg) => write!(f, "Unsupported schema: {}", msg),
            Error::Capacity(msg) => write!(f, "Capacity exceeded: {}", msg),
            Error::Usage(msg) => write!(f, "Usage error: {}", msg),
            Error::Corruption(msg) => write!(f, "Data corruption: {}", msg),
            Error::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {:#x}, got {:#x}", expected, actual)
            }
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::ReadOnly(msg) => write!(f, "Read-only: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("RLE run header truncated");
        assert_eq!(err.to_string(), "Data corruption: RLE run header truncated");

        let err = Error::ChecksumMismatch { expected: 0x12345678, actual: 0x87654321 };
        assert!(err.to_string().contains("0x12345678"));
        assert!(err.to_string().contains("0x87654321"));
        assert!(err.is_corruption());

        let err = Error::capacity("row of 9000 bytes");
        assert!(err.to_string().starts_with("Capacity exceeded"));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
