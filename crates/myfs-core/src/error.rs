//! Engine error types.

use std::io;
use thiserror::Error;

/// A rejected mount option.
///
/// These never fail a mount: the offending option is logged, reported back
/// to the caller, and the default value is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MountOptionError {
    /// Key is not recognised by this filesystem.
    #[error("unrecognized mount option: {key}")]
    UnknownKey { key: String },

    /// Key was given without `=value`.
    #[error("mount option {key} requires a value")]
    MissingValue { key: String },

    /// Value does not parse as an integer.
    #[error("invalid value for {key}: {value:?}")]
    Malformed { key: String, value: String },

    /// Value parsed but is zero or negative.
    #[error("{key} must be positive, got {value}")]
    NonPositive { key: String, value: i64 },
}

impl MountOptionError {
    /// The option key this diagnostic refers to.
    pub fn key(&self) -> &str {
        match self {
            MountOptionError::UnknownKey { key }
            | MountOptionError::MissingValue { key }
            | MountOptionError::Malformed { key, .. }
            | MountOptionError::NonPositive { key, .. } => key,
        }
    }
}

/// Filesystem error type.
#[derive(Debug, Error)]
pub enum FsError {
    /// Entry or node not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Entry already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a regular file.
    #[error("not a regular file: {0}")]
    NotARegularFile(String),

    /// Operation does not apply to directories.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Entry name longer than `NAME_MAX`.
    #[error("file name too long: {0}")]
    NameTooLong(String),

    /// Page or node allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// File would grow past the size limit.
    #[error("file too large")]
    FileTooLarge,

    /// Not a symbolic link.
    #[error("not a symbolic link: {0}")]
    NotASymlink(String),

    /// Malformed name or an impossible request (e.g. moving a directory
    /// into itself).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation refused on this node.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Rejected mount option.
    #[error(transparent)]
    InvalidMountOption(#[from] MountOptionError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(what: impl Into<String>) -> Self {
        Self::NotADirectory(what.into())
    }

    /// Create a NotARegularFile error.
    pub fn not_a_regular_file(what: impl Into<String>) -> Self {
        Self::NotARegularFile(what.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(what: impl Into<String>) -> Self {
        Self::IsADirectory(what.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(what: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(what.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Convert FsError to std::io::Error so a host can hand it straight back
/// as an errno-carrying error.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            FsError::NotARegularFile(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            FsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            FsError::NameTooLong(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::OutOfMemory => io::Error::new(io::ErrorKind::OutOfMemory, "out of memory"),
            FsError::FileTooLarge => io::Error::new(io::ErrorKind::FileTooLarge, "file too large"),
            FsError::NotASymlink(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            FsError::InvalidMountOption(e) => io::Error::new(io::ErrorKind::InvalidInput, e),
            FsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
