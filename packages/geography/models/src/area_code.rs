//! Area code and code-vintage newtypes.
//!
//! An area code only identifies an area within one *vintage* (edition) of
//! the geography definitions: the 2011 and 2021 small-area geographies
//! reuse the same textual scheme but assign different codes, so joining
//! across vintages silently produces nulls. Both the code and the vintage
//! are therefore explicit types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an area within a single geography vintage.
///
/// Codes are normalized (trimmed, ASCII-uppercased) on construction so
/// `"e01000001 "` and `"E01000001"` compare equal. Ordering is plain string
/// order, which is also the tie-break order for shared boundaries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaCode(String);

impl AreaCode {
    /// Normalizes and wraps a raw code. Returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the normalized code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AreaCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Edition of a geography definition (e.g. `"2021"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeVintage(String);

impl CodeVintage {
    /// Wraps a declared vintage label, trimming whitespace.
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self(label.trim().to_string())
    }

    /// Returns the vintage label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether codes of `other` can be joined against codes of `self`
    /// without translation.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for CodeVintage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_codes() {
        assert_eq!(
            AreaCode::parse(" e01000001 "),
            AreaCode::parse("E01000001")
        );
        assert_eq!(AreaCode::parse("E01000001").unwrap().as_str(), "E01000001");
    }

    #[test]
    fn blank_code_is_none() {
        assert!(AreaCode::parse("   ").is_none());
        assert!(AreaCode::parse("").is_none());
    }

    #[test]
    fn codes_order_as_strings() {
        let a = AreaCode::parse("E01000001").unwrap();
        let b = AreaCode::parse("E01000002").unwrap();
        assert!(a < b);
    }

    #[test]
    fn vintage_compatibility() {
        let v2021 = CodeVintage::new("2021");
        assert!(v2021.is_compatible_with(&CodeVintage::new(" 2021")));
        assert!(!v2021.is_compatible_with(&CodeVintage::new("2011")));
    }
}
