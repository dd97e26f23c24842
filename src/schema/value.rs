use rustc_hash::FxHashMap;
use std::fmt;

use super::token::Token;

/// A dynamic value produced by the convenience grammar and stored in macro
/// tables, style maps, and command arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// An already-expanded token sequence (eager macros).
    Tokens(Vec<Token>),
}

/// Style attributes attached to characters, e.g. `fg`, `bg`, `bold`.
pub type StyleMap = FxHashMap<String, Value>;

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Truthiness used for flag-like conv fields: `false`, `null`, zero, and
    /// empty strings or token lists are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::String(s) => !s.is_empty(),
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Bool(b) => *b,
            Self::Null => false,
            Self::Tokens(t) => !t.is_empty(),
        }
    }

    /// Equality used by `\ifelse`: numbers compare across int/float, and a
    /// string equals a scalar with the same text form.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::String(s), Self::Int(_) | Self::Float(_) | Self::Bool(_))
            | (Self::Int(_) | Self::Float(_) | Self::Bool(_), Self::String(s)) => {
                let scalar = if matches!(self, Self::String(_)) { other } else { self };
                *s == scalar.to_string()
            }
            _ => self == other,
        }
    }
}

/// Text form used when a value is spliced into a macro template.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => Ok(()),
            Self::Tokens(tokens) => {
                for t in tokens {
                    if let Some(ch) = t.as_char() {
                        write!(f, "{ch}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
