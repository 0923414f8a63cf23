use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuarryError>;

#[derive(Error, Debug)]
pub enum QuarryError {
    /// A file could not be read or written while indexing or rendering.
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A query line that the parser rejected. `column` is a char offset into the line.
    #[error("cannot parse '{query}': {message} (at column {column})")]
    MalformedQuery {
        query: String,
        message: String,
        column: usize,
    },

    /// The index store could not be opened, created or published.
    #[error("cannot open index at {}: {message}", path.display())]
    IndexOpen { path: PathBuf, message: String },

    /// A matched document's source file is gone or unreadable at render time.
    #[error("content unavailable for {}: {reason}", path.display())]
    ContentUnavailable { path: PathBuf, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuarryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn index_open(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::IndexOpen { path: path.into(), message: message.into() }
    }
}
