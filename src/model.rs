use std::path::PathBuf;

/// A completed `KEY=VALUE` entry, before expansion and coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub raw: String,
    pub source: Option<PathBuf>,
    /// 1-based line on which the entry started.
    pub line: u32,
}

/// Quote character that opened a quoted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteChar {
    Single,
    Double,
}

impl QuoteChar {
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            '\'' => Some(Self::Single),
            '"' => Some(Self::Double),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Single => '\'',
            Self::Double => '"',
        }
    }
}

/// Parser state carried from one physical line to the next.
///
/// Only non-empty while a multiline quoted value is open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseState {
    pub(crate) quote: Option<QuoteChar>,
    pub(crate) pending_key: String,
    pub(crate) pending_value: String,
    pub(crate) pending_line: u32,
}

impl ParseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_quotes(&self) -> bool {
        self.quote.is_some()
    }

    pub fn quote(&self) -> Option<QuoteChar> {
        self.quote
    }

    pub fn pending_key(&self) -> &str {
        &self.pending_key
    }

    pub fn pending_value(&self) -> &str {
        &self.pending_value
    }

    pub(crate) fn open(&mut self, quote: QuoteChar, key: &str, value: &str, line: u32) {
        self.quote = Some(quote);
        self.pending_key.clear();
        self.pending_key.push_str(key);
        self.pending_value.clear();
        self.pending_value.push_str(value);
        self.pending_line = line;
    }

    pub(crate) fn take(&mut self) -> (String, String, u32) {
        let line = self.pending_line;
        let key = std::mem::take(&mut self.pending_key);
        let value = std::mem::take(&mut self.pending_value);
        self.quote = None;
        self.pending_line = 0;
        (key, value, line)
    }
}

/// Which identifiers are accepted as keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPattern {
    /// `[A-Za-z_][A-Za-z0-9_]*`, accepted while scanning files.
    #[default]
    Loose,
    /// `[A-Z_][A-Z0-9_]*`, required by store lookups.
    Strict,
}

impl KeyPattern {
    pub fn matches(self, key: &str) -> bool {
        let mut chars = key.chars();
        let Some(first) = chars.next() else {
            return false;
        };

        match self {
            Self::Loose => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            }
            Self::Strict => is_strict_start(first) && chars.all(is_strict_char),
        }
    }
}

pub(crate) fn is_strict_start(ch: char) -> bool {
    ch.is_ascii_uppercase() || ch == '_'
}

pub(crate) fn is_strict_char(ch: char) -> bool {
    ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_'
}

/// Summary of the load operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_existing: usize,
    pub skipped_lines: usize,
    pub files_read: usize,
}

/// Variable expansion behavior for loaded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    /// Expand `$VAR` and `${VAR}` references against the store.
    #[default]
    Expand,
    /// Keep values as parsed; only coercion applies.
    Disabled,
}
