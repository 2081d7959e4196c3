use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors raised while loading or reading dotenv input.
#[derive(Debug, Error)]
pub enum Error {
    #[error("dotenv file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to read dotenv file {}: {source}", .path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid UTF-8 in {}: {source}", display_source(.path.as_ref()))]
    InvalidEncoding {
        path: Option<PathBuf>,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    KeyFormat(#[from] KeyFormatError),

    #[error(transparent)]
    UnterminatedQuote(#[from] UnterminatedQuote),
}

/// A recoverable, per-line parse failure.
///
/// The driver logs it and moves on to the next line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}: {kind} in `{content}`")]
pub struct SyntaxError {
    pub line: u32,
    pub kind: SyntaxErrorKind,
    pub content: String,
}

impl SyntaxError {
    pub(crate) fn new(line: u32, kind: SyntaxErrorKind, content: &str) -> Self {
        Self {
            line,
            kind,
            content: content.trim_end_matches('\n').to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    MissingEquals,
    InvalidKey,
}

impl Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEquals => write!(f, "missing equals sign"),
            Self::InvalidKey => write!(f, "invalid key format"),
        }
    }
}

/// A lookup key that does not match `[A-Z_][A-Z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid key format `{key}`: expected uppercase letters, digits and underscores")]
pub struct KeyFormatError {
    pub key: String,
}

/// A quoted value still open when the input ended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "unterminated quoted value for `{key}` opened at line {line} in {}",
    display_source(.path.as_ref())
)]
pub struct UnterminatedQuote {
    pub key: String,
    pub line: u32,
    pub path: Option<PathBuf>,
}

fn display_source(path: Option<&PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "<input>".to_owned(),
    }
}
