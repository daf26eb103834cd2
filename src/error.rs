//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.

use thiserror::Error;

/// Main error type for treeseq operations
#[derive(Error, Debug)]
pub enum TreeSeqError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata rejected by the schema bound to a table or the collection
    #[error("Schema violation: {message}")]
    SchemaViolation { message: String },

    /// Metadata bytes that cannot be decoded under the bound schema's codec
    #[error("Malformed metadata: {message}")]
    MalformedMetadata { message: String },

    /// Row index past the end of a table
    #[error("Index {index} out of range for table of length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    /// Parallel column arrays disagree in length
    #[error("Column length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Sequence length or another bound is outside its valid range
    #[error("Invalid bound: {message}")]
    InvalidBound { message: String },

    /// An edge whose parent is not strictly older than its child
    #[error("Time order violation: {message}")]
    TimeOrderViolation { message: String },

    /// A genomic interval outside the sequence or with left >= right
    #[error("Bad interval: {message}")]
    BadInterval { message: String },

    /// Two edges with identical (left, right, parent, child)
    #[error("Duplicate edge at row {index}")]
    DuplicateEdge { index: usize },

    /// Two sites at the same genomic position
    #[error("Duplicate site position {position}")]
    DuplicateSitePosition { position: f64 },

    /// A cycle in the individual parent-reference graph
    #[error("Individual {individual} is part of a parent cycle")]
    IndividualCycle { individual: i32 },

    /// A cross-table reference to a row that does not exist
    #[error("Dangling reference: {message}")]
    DanglingReference { message: String },

    /// Tables are not in canonical order; call sort() first
    #[error("Tables not sorted: {message}")]
    NotSorted { message: String },

    /// A loaded file whose stored identifier disagrees with its contents
    #[error("Integrity mismatch: stored {stored}, computed {computed}")]
    IntegrityMismatch { stored: String, computed: String },

    /// A file that is not a valid container (bad magic, truncation, version)
    #[error("Invalid file: {message}")]
    InvalidFile { message: String },

    /// An operation the data cannot support (e.g. alignments without a
    /// reference sequence or on a non-discrete genome)
    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },
}

/// Type alias for Results using TreeSeqError
pub type Result<T> = std::result::Result<T, TreeSeqError>;

impl TreeSeqError {
    /// Create a schema violation error
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            message: message.into(),
        }
    }

    /// Create a malformed metadata error
    pub fn malformed_metadata(message: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            message: message.into(),
        }
    }

    /// Create an invalid bound error
    pub fn invalid_bound(message: impl Into<String>) -> Self {
        Self::InvalidBound {
            message: message.into(),
        }
    }

    /// Create a time order violation error
    pub fn time_order(message: impl Into<String>) -> Self {
        Self::TimeOrderViolation {
            message: message.into(),
        }
    }

    /// Create a bad interval error
    pub fn bad_interval(message: impl Into<String>) -> Self {
        Self::BadInterval {
            message: message.into(),
        }
    }

    /// Create a dangling reference error
    pub fn dangling(message: impl Into<String>) -> Self {
        Self::DanglingReference {
            message: message.into(),
        }
    }

    /// Create a not-sorted error
    pub fn not_sorted(message: impl Into<String>) -> Self {
        Self::NotSorted {
            message: message.into(),
        }
    }

    /// Create an invalid file error
    pub fn invalid_file(message: impl Into<String>) -> Self {
        Self::InvalidFile {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}
