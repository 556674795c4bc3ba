use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// A tag name failed the `[A-Za-z0-9-]+` check. Raised before any I/O.
    Validation(String),
    Read {
        key: String,
        source: io::Error,
    },
    Write {
        key: String,
        source: io::Error,
    },
    Config(serde_json::Error),
    Watcher(notify::Error),
}

impl Error {
    pub(crate) fn read(key: &str, source: io::Error) -> Self {
        Error::Read {
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn write(key: &str, source: io::Error) -> Self {
        Error::Write {
            key: key.to_string(),
            source,
        }
    }

    /// The note key this error is about, if it is a per-note failure.
    pub fn note_key(&self) -> Option<&str> {
        match self {
            Error::Read { key, .. } | Error::Write { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Validation(name) => write!(f, "invalid tag name: {:?}", name),
            Error::Read { key, source } => write!(f, "failed to read note {}: {}", key, source),
            Error::Write { key, source } => write!(f, "failed to write note {}: {}", key, source),
            Error::Config(err) => write!(f, "invalid configuration: {}", err),
            Error::Watcher(err) => write!(f, "filesystem watcher error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Read { source, .. } | Error::Write { source, .. } => Some(source),
            Error::Config(err) => Some(err),
            Error::Watcher(err) => Some(err),
            Error::Validation(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err)
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watcher(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
