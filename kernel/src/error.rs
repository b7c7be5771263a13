//! Definitions of errors that the kernel can encounter

use std::backtrace::{Backtrace, BacktraceStatus};

use crate::arrow::error::ArrowError;
use crate::table_features::UnsupportedFeature;

/// A [`std::result::Result`] that has the kernel [`Error`] as the error variant
pub type IcebergResult<T, E = Error> = std::result::Result<T, E>;

/// All the types of errors that the kernel can run into
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// This is an error that includes a backtrace. To have a particular type of error include such
    /// backtrace (when RUST_BACKTRACE is enabled), wrap it in a call to [`Error::with_backtrace`].
    #[error("{source}\n{backtrace}")]
    Backtraced {
        source: Box<Self>,
        backtrace: Box<Backtrace>,
    },

    /// The table uses a feature the caller has not enabled. Carries the gate's rejection reason.
    #[error(transparent)]
    UnsupportedTableFeature(UnsupportedFeature),

    /// An output field was requested that the projection does not know how to produce, or was
    /// declared with a type the projection cannot write into.
    #[error("Invalid fieldName for table files query {0}")]
    InvalidFieldRequest(String),

    /// Failure encoding specs, schemas or partition info into their transportable forms
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error performing operations on arrow data
    #[error(transparent)]
    Arrow(#[from] ArrowError),

    /// An error interacting with the filesystem or another storage layer
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A file that was expected to exist could not be found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The buffer provider refused to hand out a buffer of the requested size
    #[error("Unable to allocate {requested} bytes (limit {limit})")]
    BufferAllocation { requested: usize, limit: usize },

    /// A snapshot id was requested that the table does not contain
    #[error("Snapshot {0} does not exist")]
    MissingSnapshot(i64),

    /// A partition spec id was referenced that the table does not contain
    #[error("Partition spec {0} does not exist")]
    MissingPartitionSpec(i32),

    /// A value could not be decoded as, or did not match, its declared type
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),

    /// A snapshot summary counter could not be parsed
    #[error("Invalid value '{value}' for snapshot summary key '{key}'")]
    InvalidSummaryValue { key: String, value: String },

    /// The schema is malformed (duplicate ids, unknown types and so on)
    #[error("Invalid schema: {0}")]
    Schema(String),

    /// The table location could not be interpreted
    #[error("Invalid table location: {0}")]
    InvalidTableLocation(String),

    /// A requested operation is not supported
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// An internal invariant was broken; this indicates a bug
    #[error("Internal error {0}. This is a kernel bug, please report.")]
    InternalError(String),

    /// A generic error with a message
    #[error("Generic iceberg kernel error: {0}")]
    Generic(String),
}

// Convenience constructors for Error types that take a String argument
impl Error {
    pub fn generic(msg: impl ToString) -> Self {
        Self::Generic(msg.to_string())
    }
    pub fn unsupported_feature(feature: UnsupportedFeature) -> Self {
        Self::UnsupportedTableFeature(feature)
    }
    pub fn invalid_field(name: impl ToString) -> Self {
        Self::InvalidFieldRequest(name.to_string())
    }
    pub fn invalid_literal(msg: impl ToString) -> Self {
        Self::InvalidLiteral(msg.to_string())
    }
    pub fn schema(msg: impl ToString) -> Self {
        Self::Schema(msg.to_string())
    }
    pub fn file_not_found(path: impl ToString) -> Self {
        Self::FileNotFound(path.to_string())
    }
    pub fn invalid_table_location(location: impl ToString) -> Self {
        Self::InvalidTableLocation(location.to_string())
    }
    pub fn unsupported(msg: impl ToString) -> Self {
        Self::Unsupported(msg.to_string())
    }
    pub fn internal_error(msg: impl ToString) -> Self {
        Self::InternalError(msg.to_string()).with_backtrace()
    }

    /// Retry policy belongs to the storage layer; only its failures may be worth another attempt.
    /// Everything the kernel raises itself is a configuration or programming error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backtraced { source, .. } => source.is_retryable(),
            Self::Io(_) => true,
            _ => false,
        }
    }

    /// Capture a backtrace when the error is constructed.
    #[must_use]
    pub fn with_backtrace(self) -> Self {
        let backtrace = Backtrace::capture();
        match backtrace.status() {
            BacktraceStatus::Captured => Self::Backtraced {
                source: Box::new(self),
                backtrace: Box::new(backtrace),
            },
            _ => self,
        }
    }
}

impl From<UnsupportedFeature> for Error {
    fn from(feature: UnsupportedFeature) -> Self {
        Self::UnsupportedTableFeature(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_feature_message_is_verbatim() {
        let err = Error::unsupported_feature(UnsupportedFeature::DeleteFiles);
        assert_eq!(
            err.to_string(),
            "Iceberg V2 tables with delete files are not supported."
        );
        let err: Error = UnsupportedFeature::EqualityDeletes.into();
        assert_eq!(
            err.to_string(),
            "Iceberg V2 tables with equality deletes are not supported."
        );
    }

    #[test]
    fn only_io_is_retryable() {
        let io = Error::from(std::io::Error::other("connection reset"));
        assert!(io.is_retryable());
        assert!(!Error::invalid_field("bogus").is_retryable());
        assert!(!Error::unsupported_feature(UnsupportedFeature::DeleteFiles).is_retryable());
        let backtraced = Error::Backtraced {
            source: Box::new(Error::from(std::io::Error::other("eof"))),
            backtrace: Box::new(Backtrace::disabled()),
        };
        assert!(backtraced.is_retryable());
    }
}
