//! Literal values and their canonical text form.

use serde::{Deserialize, Serialize};

/// A typed literal in a SQL expression.
///
/// The canonical text form is the only rendering that participates in
/// structural comparison: integers without leading zeros or a unary plus,
/// strings single-quoted with embedded quotes doubled, booleans lowercase,
/// nulls as the keyword `NULL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    /// SQL NULL.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
}

impl LiteralValue {
    /// Render the canonical text form.
    pub fn canonical_text(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => {
                // i64-valued floats render with a trailing ".0" so that the
                // text stays unambiguous about the literal's type.
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// True for boolean `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    /// True for boolean `false`.
    pub fn is_false(&self) -> bool {
        matches!(self, Self::Bool(false))
    }
}

impl std::fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_text())
    }
}

impl From<bool> for LiteralValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for LiteralValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for LiteralValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for LiteralValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_text() {
        assert_eq!(LiteralValue::Null.canonical_text(), "NULL");
        assert_eq!(LiteralValue::Bool(true).canonical_text(), "true");
        assert_eq!(LiteralValue::Bool(false).canonical_text(), "false");
        assert_eq!(LiteralValue::Integer(42).canonical_text(), "42");
        assert_eq!(LiteralValue::Integer(-7).canonical_text(), "-7");
        assert_eq!(LiteralValue::Float(1.5).canonical_text(), "1.5");
        assert_eq!(LiteralValue::Float(2.0).canonical_text(), "2.0");
    }

    #[test]
    fn test_string_escaping() {
        let lit = LiteralValue::String("O'Brien".to_string());
        assert_eq!(lit.canonical_text(), "'O''Brien'");
    }
}
