use std::io;

use thiserror::Error;

/// The closed set of outcomes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unsupported,
    Misconfigured,
    Malformed,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The resource is absent at this tier. The only error a fallback recovers from.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write would replace content that must stay immutable.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error("malformed identifier {id:?}: {reason}")]
    MalformedIdentifier { id: String, reason: &'static str },

    #[error("http error for {url}: {detail}")]
    Http {
        url: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("corrupt archive {path}: {detail}")]
    Archive { path: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Misconfigured(_) => ErrorKind::Misconfigured,
            Error::MalformedIdentifier { .. } => ErrorKind::Malformed,
            Error::Http { .. } | Error::Archive { .. } | Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub(crate) fn malformed(id: &str, reason: &'static str) -> Self {
        Error::MalformedIdentifier {
            id: id.to_string(),
            reason,
        }
    }

    /// Translate an io error raised while opening `what` for reading, so that an
    /// absent file surfaces as `NotFound` rather than a generic io failure.
    pub(crate) fn from_open(err: io::Error, what: impl std::fmt::Display) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Error::NotFound(what.to_string())
        } else {
            Error::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
