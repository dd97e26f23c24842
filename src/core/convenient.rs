/// Convenience value grammar — sigil-prefixed literals and macro lookups used
/// in command arguments and sentence conv expressions.

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::macros::MacroScope;
use super::modules::PathError;
use crate::schema::value::Value;

#[derive(Debug, Error, PartialEq)]
pub enum ConvError {
    #[error("'{0}' is not a valid integer")]
    InvalidInt(String),
    #[error("'{0}' is not a valid float")]
    InvalidFloat(String),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Parse one value expression. The first character selects the type:
///
/// | sigil | value |
/// |-------|-------|
/// | `=text` | string `text` |
/// | `;42` | integer |
/// | `:1.5` | float |
/// | `+` / `-` | true / false |
/// | `?` | null |
/// | `!name` | the macro `name`, or nothing when undefined |
/// | `^name` | whether the macro `name` is defined |
///
/// Anything else yields `Ok(None)`, meaning "absent", which callers keep
/// distinct from null.
pub fn parse_value(s: &str, scope: &MacroScope) -> Result<Option<Value>, ConvError> {
    let mut chars = s.chars();
    let Some(sigil) = chars.next() else {
        return Ok(None);
    };
    let rest = chars.as_str();
    let value = match sigil {
        '=' => Value::String(rest.to_string()),
        ';' => Value::Int(
            rest.trim()
                .parse()
                .map_err(|_| ConvError::InvalidInt(rest.to_string()))?,
        ),
        ':' => Value::Float(
            rest.trim()
                .parse()
                .map_err(|_| ConvError::InvalidFloat(rest.to_string()))?,
        ),
        '+' => Value::Bool(true),
        '-' => Value::Bool(false),
        '?' => Value::Null,
        '!' => return Ok(scope.get(rest)?.cloned()),
        '^' => Value::Bool(scope.contains(rest)?),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn is_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '<')
}

/// Split `key<value expression>`. The key is the leading run of identifier
/// and module path characters.
pub fn parse_pair(s: &str, scope: &MacroScope) -> Result<(String, Option<Value>), ConvError> {
    let split = s.find(|ch: char| !is_key_char(ch)).unwrap_or(s.len());
    let (key, expr) = s.split_at(split);
    Ok((key.to_string(), parse_value(expr, scope)?))
}

/// Parse a comma-separated list of pairs. Commas nested inside `[...]` do
/// not split, so command templates can be passed as values. Entries whose
/// value is absent are left out of the map.
pub fn parse_dict(s: &str, scope: &MacroScope) -> Result<FxHashMap<String, Value>, ConvError> {
    let mut dict = FxHashMap::default();
    for piece in split_top_level(s) {
        let (key, value) = parse_pair(piece.trim_start(), scope)?;
        if let Some(value) = value {
            dict.insert(key, value);
        }
    }
    Ok(dict)
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&s[start..]);
    pieces
}
