use std::fmt;

/// Errors that can occur during image store operations.
#[derive(Debug)]
pub enum StoreError {
    /// The supplied identifier is not a canonical hyphenated UUID.
    InvalidUuid(String),
    /// An I/O error occurred.
    Io(std::io::Error),
    /// A lock sentinel could not be acquired.
    Lock { path: String, source: std::io::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUuid(raw) => write!(f, "invalid image uuid: {raw:?}"),
            Self::Io(err) => write!(f, "image store IO error: {err}"),
            Self::Lock { path, source } => write!(f, "failed to lock {path}: {source}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Lock { source, .. } => Some(source),
            Self::InvalidUuid(_) => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
