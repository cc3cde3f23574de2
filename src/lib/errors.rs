//! Custom error types for bamfq operations.

use thiserror::Error;

/// Result type alias for bamfq operations
pub type Result<T> = std::result::Result<T, BamfqError>;

/// Error type for bamfq operations
#[derive(Error, Debug)]
pub enum BamfqError {
    /// A record's encoded structure cannot be safely re-emitted as FASTQ.
    /// This is fatal: skipping such a record would silently corrupt output.
    #[error("Unsupported record structure for read '{name}': {reason}")]
    UnsupportedRecord {
        /// The read name
        name: String,
        /// Explanation of why the record cannot be handled
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// File format error
    #[error("Invalid {file_type} file '{path}': {reason}")]
    InvalidFileFormat {
        /// Type of file (e.g., "BAM", "shard")
        file_type: String,
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Required reference sequence not found
    #[error("Reference sequence '{ref_name}' not found in header")]
    ReferenceNotFound {
        /// The reference sequence name
        ref_name: String,
    },

    /// A region restriction could not be parsed
    #[error("Invalid region '{region}': {reason}")]
    InvalidRegion {
        /// The region string as supplied
        region: String,
        /// Explanation of the problem
        reason: String,
    },
}
