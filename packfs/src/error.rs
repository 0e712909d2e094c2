use thiserror::Error;

/// Errors that can occur while opening, mounting or writing packages.
///
/// A missing entry is never an error: lookups return `None` instead.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The requested file or package does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An IO error occurred while accessing the underlying medium.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The path is invalid (empty, contains `..`, or other normalization failure).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A loader accepted the stream but its contents are inconsistent.
    #[error("malformed package {name}: {reason}")]
    Malformed { name: String, reason: String },

    /// Every registered loader declined the stream.
    #[error("no package loader recognized this file: {0}")]
    NoLoader(String),

    /// The package kind does not support write operations.
    #[error("package is read-only: {0}")]
    ReadOnly(String),

    /// The ZIP backend failed.
    #[error("zip error in {name}: {source}")]
    Zip {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// A package is already mounted under this explicit name.
    #[error("explicit name already mounted: {0}")]
    DuplicateMount(String),

    /// The mount manifest could not be parsed.
    #[error("invalid mount manifest: {0}")]
    Manifest(#[from] toml::de::Error),
}

impl PackageError {
    pub(crate) fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PackageError::Malformed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn zip(name: impl Into<String>, source: zip::result::ZipError) -> Self {
        PackageError::Zip {
            name: name.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PackageError>;
