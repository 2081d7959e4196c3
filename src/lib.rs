//! Parse `.env` files into typed values.
//!
//! A [`LineParser`] turns physical lines into raw key/value [`Pair`]s,
//! [`expand`] substitutes `$VAR`/`${VAR}` references against a lookup, and
//! [`coerce`] turns the expanded text into a [`TypedValue`]. [`EnvLoader`]
//! drives all three over one or more files and writes the results into an
//! [`EnvStore`].
//!
//! The default store is in memory. Loading into the process environment
//! (`EnvStore::process`, `dotenv`, `from_path_into_env`) is `unsafe`, because
//! callers must guarantee no concurrent process-environment access.

mod error;
mod loader;
mod model;
mod parser;
mod resolve;
mod source;
mod store;
mod value;

pub use error::{Error, KeyFormatError, SyntaxError, SyntaxErrorKind, UnterminatedQuote};
pub use loader::{EnvLoader, dotenv, from_path, from_path_into_env, from_paths, load};
pub use model::{KeyPattern, LoadReport, Pair, ParseState, QuoteChar, SubstitutionMode};
pub use parser::{
    LineParser, Parsed, parse_bytes, parse_bytes_with_pattern, parse_reader,
    parse_reader_with_pattern, parse_str, parse_str_with_pattern,
};
pub use resolve::{coerce, expand};
pub use source::LineSource;
pub use store::EnvStore;
pub use value::TypedValue;
