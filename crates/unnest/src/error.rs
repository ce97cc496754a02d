//! Error types for archive discovery, validation and extraction.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extraction operations.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Archive file not found at the specified path.
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    /// The archive format is not supported.
    #[error("Unsupported archive type: {0}")]
    UnsupportedFormat(String),

    /// The archive is encrypted. Decryption is never attempted.
    #[error("Password protected archive")]
    PasswordProtected,

    /// The archive is corrupted or malformed.
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    /// Uncompressed/compressed ratio is above the configured limit.
    #[error("Extraction ratio {ratio:.1} exceeds limit {limit}")]
    RatioExceeded {
        /// Computed extraction ratio
        ratio: f64,
        /// Configured maximum ratio
        limit: f64,
    },

    /// The archive nests other archives deeper than allowed.
    #[error("Archive exceeds max nested depth: found {depth}, limit {limit}")]
    DepthExceeded {
        /// Depth found by the nested scan
        depth: u32,
        /// Configured maximum depth
        limit: u32,
    },

    /// The extraction size limit was exceeded.
    #[error("Size limit exceeded: {current} bytes > {limit} bytes")]
    SizeLimitExceeded {
        /// Current extracted size in bytes
        current: u64,
        /// Configured size limit in bytes
        limit: u64,
    },

    /// The OS refused a write or delete.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// The run root exists but is not a directory.
    #[error("Not a directory: {0}")]
    InvalidRoot(PathBuf),

    /// Walking the directory tree failed.
    #[error("Directory scan failed: {0}")]
    Scan(#[from] walkdir::Error),

    /// An I/O error occurred during extraction.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

}

impl ExtractError {
    /// Wrap an I/O error, promoting permission failures to [`ExtractError::PermissionDenied`].
    pub fn from_io(err: std::io::Error, context: impl std::fmt::Display) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            ExtractError::PermissionDenied(format!("{}: {}", context, err))
        } else {
            ExtractError::Io(err)
        }
    }

    /// Statistics bucket this error is counted under.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExtractError::NotFound(_)
            | ExtractError::UnsupportedFormat(_)
            | ExtractError::InvalidRoot(_) => ErrorCategory::ValidationError,
            ExtractError::PasswordProtected => ErrorCategory::PasswordProtected,
            ExtractError::Corrupted(_) => ErrorCategory::CorruptionError,
            ExtractError::RatioExceeded { .. } | ExtractError::SizeLimitExceeded { .. } => {
                ErrorCategory::ZipbombProtection
            }
            ExtractError::DepthExceeded { .. } => ErrorCategory::NestedDepthExceeded,
            ExtractError::PermissionDenied(_) => ErrorCategory::PermissionError,
            ExtractError::Security(_) | ExtractError::Io(_) => ErrorCategory::ExtractionError,
            ExtractError::Scan(_) => ErrorCategory::UnknownError,
        }
    }
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),

    /// Unsafe entry type detected (symlink, hard link, device).
    #[error("Unsafe entry type: {0}")]
    UnsafeEntryType(String),
}

/// Failure buckets used by the statistics recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ValidationError,
    ExtractionError,
    PermissionError,
    CorruptionError,
    PasswordProtected,
    ZipbombProtection,
    NestedDepthExceeded,
    UnknownError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ValidationError => "validation_error",
            ErrorCategory::ExtractionError => "extraction_error",
            ErrorCategory::PermissionError => "permission_error",
            ErrorCategory::CorruptionError => "corruption_error",
            ErrorCategory::PasswordProtected => "password_protected",
            ErrorCategory::ZipbombProtection => "zipbomb_protection",
            ErrorCategory::NestedDepthExceeded => "nested_depth_exceeded",
            ErrorCategory::UnknownError => "unknown_error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_ratio_message_names_ratio_and_limit() {
        let err = ExtractError::RatioExceeded {
            ratio: 512.345,
            limit: 50.0,
        };
        assert_eq!(err.to_string(), "Extraction ratio 512.3 exceeds limit 50");
    }

    #[test]
    fn test_depth_message() {
        let err = ExtractError::DepthExceeded { depth: 1, limit: 1 };
        assert!(err.to_string().contains("max nested depth"));
    }

    #[test]
    fn test_from_io_promotes_permission_denied() {
        let err = ExtractError::from_io(
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
            "/tmp/x",
        );
        assert!(matches!(err, ExtractError::PermissionDenied(_)));
        assert_eq!(err.category(), ErrorCategory::PermissionError);

        let err = ExtractError::from_io(io::Error::new(io::ErrorKind::Other, "boom"), "/tmp/x");
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            ExtractError::PasswordProtected.category(),
            ErrorCategory::PasswordProtected
        );
        assert_eq!(
            ExtractError::Corrupted("bad".into()).category(),
            ErrorCategory::CorruptionError
        );
        assert_eq!(
            ExtractError::RatioExceeded {
                ratio: 200.0,
                limit: 100.0
            }
            .category(),
            ErrorCategory::ZipbombProtection
        );
        assert_eq!(
            ExtractError::DepthExceeded { depth: 3, limit: 3 }.category(),
            ErrorCategory::NestedDepthExceeded
        );
        assert_eq!(
            ExtractError::NotFound(PathBuf::from("a.zip")).category(),
            ErrorCategory::ValidationError
        );
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::ZipbombProtection).unwrap();
        assert_eq!(json, "\"zipbomb_protection\"");
        assert_eq!(ErrorCategory::NestedDepthExceeded.to_string(), "nested_depth_exceeded");
    }
}
