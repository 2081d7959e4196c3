use std::fmt::{Display, Formatter};

/// A coerced dotenv value.
///
/// The [`Display`] form is canonical: coercing it again yields an equal value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    Null,
    Empty,
    Integer(i64),
    Float(f64),
    String(String),
}

impl TypedValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Borrow the text of a `String` value; `Empty` reads as `""`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            Self::Empty => Some(""),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short lowercase name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Null => "null",
            Self::Empty => "empty",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

impl Display for TypedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Null => f.write_str("null"),
            Self::Empty => Ok(()),
            Self::Integer(value) => write!(f, "{value}"),
            // Always carries a `.`, so the text reads back as a float.
            Self::Float(value) => {
                let text = format!("{value:?}");
                match text.find('e') {
                    Some(exp) if !text.contains('.') => {
                        write!(f, "{}.0{}", &text[..exp], &text[exp..])
                    }
                    _ => f.write_str(&text),
                }
            }
            Self::String(value) => f.write_str(value),
        }
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Self::Empty
        } else {
            Self::String(value.to_owned())
        }
    }
}
