use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

use crate::error::Error;

/// Physical lines of dotenv text with line terminators normalized to `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSource<'a> {
    text: Cow<'a, str>,
}

impl<'a> LineSource<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text: normalize_newlines(text),
        }
    }

    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(bytes)
            .map_err(|source| Error::InvalidEncoding { path: None, source })?;
        Ok(Self::new(text))
    }

    /// Iterate lines from the start. Each line keeps its trailing `\n`;
    /// the last one lacks it when the text does not end with a newline.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split_inclusive('\n')
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl LineSource<'static> {
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, Error> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Self::from_owned_bytes(buf, None)
    }

    /// Read a whole file, mapping failures onto file-level errors.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Error::FileUnreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_owned_bytes(bytes, Some(path))
    }

    fn from_owned_bytes(bytes: Vec<u8>, path: Option<&Path>) -> Result<Self, Error> {
        let text = String::from_utf8(bytes).map_err(|err| Error::InvalidEncoding {
            path: path.map(Path::to_path_buf),
            source: err.utf8_error(),
        })?;
        let text = if text.contains('\r') {
            normalize_newlines(&text).into_owned()
        } else {
            text
        };
        Ok(Self {
            text: Cow::Owned(text),
        })
    }
}

fn normalize_newlines(input: &str) -> Cow<'_, str> {
    if !input.contains('\r') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            out.push('\n');
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            continue;
        }
        out.push(ch);
    }

    Cow::Owned(out)
}
