use crate::model::{is_strict_char, is_strict_start};
use crate::value::TypedValue;

/// Expand `$NAME` and `${NAME}` references in `raw`.
///
/// Each reference calls `lookup` and is replaced by the string form of the
/// returned value; names the lookup does not know expand to nothing. `\$`
/// yields a literal `$`. Names follow `[A-Z_][A-Z0-9_]*`; anything else after
/// a `$` is kept as written.
pub fn expand<F, E>(raw: &str, mut lookup: F) -> Result<String, E>
where
    F: FnMut(&str) -> Result<Option<TypedValue>, E>,
{
    if !raw.contains('$') {
        return Ok(raw.to_owned());
    }

    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0usize;
    let mut idx = 0usize;
    let bytes = raw.as_bytes();

    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' if bytes.get(idx + 1) == Some(&b'$') => {
                out.push_str(&raw[cursor..idx]);
                out.push('$');
                idx += 2;
                cursor = idx;
            }
            b'$' => {
                let Some((name_start, name_end, token_end)) = parse_reference(raw, idx) else {
                    idx += 1;
                    continue;
                };

                out.push_str(&raw[cursor..idx]);
                if let Some(value) = lookup(&raw[name_start..name_end])? {
                    out.push_str(&value.to_string());
                }

                cursor = token_end;
                idx = token_end;
            }
            _ => idx += 1,
        }
    }

    out.push_str(&raw[cursor..]);
    Ok(out)
}

fn parse_reference(input: &str, start: usize) -> Option<(usize, usize, usize)> {
    let bytes = input.as_bytes();
    let name_start = start + 1;
    let first = *bytes.get(name_start)?;

    if first == b'{' {
        let name_start = start + 2;
        let close = input[name_start..].find('}')? + name_start;
        if !is_reference_name(&input[name_start..close]) {
            return None;
        }
        return Some((name_start, close, close + 1));
    }

    if !is_strict_start(char::from(first)) {
        return None;
    }

    let mut name_end = name_start + 1;
    while name_end < bytes.len() && is_strict_char(char::from(bytes[name_end])) {
        name_end += 1;
    }

    Some((name_start, name_end, name_end))
}

fn is_reference_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_strict_start) && chars.all(is_strict_char)
}

/// Convert an expanded string into a [`TypedValue`].
///
/// Keywords match case-insensitively on the whole string. Numeric text with a
/// `.` becomes a float. Numeric text without one becomes an integer, falling
/// back to a float when it is not an exact `i64` (`1e-3`, or out of range).
pub fn coerce(expanded: &str) -> TypedValue {
    match expanded.to_ascii_lowercase().as_str() {
        "true" | "(true)" => return TypedValue::Bool(true),
        "false" | "(false)" => return TypedValue::Bool(false),
        "null" | "(null)" => return TypedValue::Null,
        "" | "empty" | "(empty)" | "\"\"" | "''" => return TypedValue::Empty,
        _ => {}
    }

    let parsed = match classify_number(expanded) {
        Some(NumberKind::Integer) => match expanded.parse::<i64>() {
            Ok(value) => Some(TypedValue::Integer(value)),
            Err(_) => parse_float(expanded),
        },
        Some(NumberKind::Exponent) => exponent_integer(expanded)
            .map(TypedValue::Integer)
            .or_else(|| parse_float(expanded)),
        Some(NumberKind::Float) => parse_float(expanded),
        None => None,
    };

    parsed.unwrap_or_else(|| TypedValue::String(expanded.to_owned()))
}

fn parse_float(input: &str) -> Option<TypedValue> {
    input
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(TypedValue::Float)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberKind {
    Integer,
    /// No `.`, but an exponent.
    Exponent,
    Float,
}

/// `[+-]? (digits ('.' digits?)? | '.' digits) ([eE] [+-]? digits)?`
fn classify_number(input: &str) -> Option<NumberKind> {
    let bytes = input.as_bytes();
    let mut idx = 0usize;
    let mut kind = NumberKind::Integer;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        idx += 1;
    }

    let mut digits = skip_digits(bytes, &mut idx);
    if bytes.get(idx) == Some(&b'.') {
        kind = NumberKind::Float;
        idx += 1;
        digits += skip_digits(bytes, &mut idx);
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(idx), Some(b'e' | b'E')) {
        if kind == NumberKind::Integer {
            kind = NumberKind::Exponent;
        }
        idx += 1;
        if matches!(bytes.get(idx), Some(b'+' | b'-')) {
            idx += 1;
        }
        if skip_digits(bytes, &mut idx) == 0 {
            return None;
        }
    }

    (idx == bytes.len()).then_some(kind)
}

/// Exact integer value of `digits[eE]exp`, if there is one.
fn exponent_integer(input: &str) -> Option<i64> {
    let (mantissa, exponent) = input.split_once(['e', 'E'])?;
    let mantissa = mantissa.parse::<i64>().ok()?;
    let exponent = exponent.parse::<i32>().ok()?;
    if mantissa == 0 {
        return Some(0);
    }
    let scale = 10i64.checked_pow(exponent.unsigned_abs())?;

    if exponent >= 0 {
        mantissa.checked_mul(scale)
    } else {
        (mantissa % scale == 0).then(|| mantissa / scale)
    }
}

fn skip_digits(bytes: &[u8], idx: &mut usize) -> usize {
    let start = *idx;
    while *idx < bytes.len() && bytes[*idx].is_ascii_digit() {
        *idx += 1;
    }
    *idx - start
}
