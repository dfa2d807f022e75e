//! Label matchers.
//!
//! A [`Matcher`] is a `(name, operator, value)` triple as written inside a
//! PromQL vector selector. Regex matchers are fully anchored, so `5..`
//! matches `500` but not `1500`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleError};

/// The label holding the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// The classic histogram bucket label.
pub const BUCKET_LABEL: &str = "le";

/// Comparison operator of a label matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchType {
    /// `=`
    #[serde(rename = "=")]
    Equal,
    /// `!=`
    #[serde(rename = "!=")]
    NotEqual,
    /// `=~`
    #[serde(rename = "=~")]
    Regex,
    /// `!~`
    #[serde(rename = "!~")]
    NotRegex,
}

impl MatchType {
    /// Returns the PromQL operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Regex => "=~",
            Self::NotRegex => "!~",
        }
    }

    /// Returns true for `=~` and `!~`.
    #[must_use]
    pub const fn is_regex(&self) -> bool {
        matches!(self, Self::Regex | Self::NotRegex)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single label matcher.
///
/// Equality, ordering and hashing only consider the name, operator and value.
#[derive(Clone)]
pub struct Matcher {
    name: String,
    match_type: MatchType,
    value: String,
    regex: Option<Regex>,
}

impl Matcher {
    /// Creates a matcher, compiling the pattern of regex matchers.
    pub fn new(
        match_type: MatchType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        let regex = if match_type.is_regex() {
            let anchored = format!("^(?s:{value})$");
            Some(Regex::new(&anchored).map_err(|e| RuleError::InvalidMatcher {
                name: name.clone(),
                reason: e.to_string(),
            })?)
        } else {
            None
        };

        Ok(Self {
            name,
            match_type,
            value,
            regex,
        })
    }

    /// Creates an `=` matcher.
    #[must_use]
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_type: MatchType::Equal,
            value: value.into(),
            regex: None,
        }
    }

    /// Creates a `!=` matcher.
    #[must_use]
    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_type: MatchType::NotEqual,
            value: value.into(),
            regex: None,
        }
    }

    /// The label name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The operator.
    #[must_use]
    pub const fn match_type(&self) -> MatchType {
        self.match_type
    }

    /// The raw value or pattern.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns a copy of this matcher with another value.
    pub fn with_value(&self, value: impl Into<String>) -> Result<Self> {
        Self::new(self.match_type, self.name.clone(), value)
    }

    /// Returns true if the given label value satisfies this matcher.
    ///
    /// A missing label is the empty string, as in Prometheus.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self.match_type {
            MatchType::Equal => self.value == value,
            MatchType::NotEqual => self.value != value,
            MatchType::Regex => self.regex.as_ref().is_some_and(|re| re.is_match(value)),
            MatchType::NotRegex => !self.regex.as_ref().is_some_and(|re| re.is_match(value)),
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.match_type == other.match_type && self.value == other.value
    }
}

impl Eq for Matcher {}

impl Hash for Matcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.match_type.hash(state);
        self.value.hash(state);
    }
}

impl PartialOrd for Matcher {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Matcher {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.name, self.match_type, &self.value).cmp(&(&other.name, other.match_type, &other.value))
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matcher({self})")
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, self.match_type, quote(&self.value))
    }
}

/// Quotes a label value the way PromQL prints it: double quotes, with
/// backslashes, quotes and control characters escaped.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\u{0b}' => out.push_str("\\v"),
            c if c.is_control() => {
                let code = u32::from(c);
                if code <= 0xff {
                    out.push_str(&format!("\\x{code:02x}"));
                } else {
                    out.push_str(&format!("\\u{code:04x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(MatchType::Equal, "200", "200", true ; "equal hit")]
    #[test_case(MatchType::Equal, "200", "500", false ; "equal miss")]
    #[test_case(MatchType::NotEqual, "200", "500", true ; "not equal hit")]
    #[test_case(MatchType::Regex, "5..", "503", true ; "regex hit")]
    #[test_case(MatchType::Regex, "5..", "1503", false ; "regex is anchored")]
    #[test_case(MatchType::NotRegex, "5..", "200", true ; "not regex hit")]
    #[test_case(MatchType::NotRegex, "5..", "500", false ; "not regex miss")]
    #[test_case(MatchType::Equal, "", "", true ; "empty matches missing label")]
    fn matches_values(match_type: MatchType, pattern: &str, value: &str, expected: bool) {
        let matcher = Matcher::new(match_type, "code", pattern).unwrap();
        assert_eq!(matcher.matches(value), expected);
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = Matcher::new(MatchType::Regex, "code", "5(..").unwrap_err();
        assert!(matches!(err, RuleError::InvalidMatcher { ref name, .. } if name == "code"));
    }

    #[test]
    fn display_quotes_value() {
        let matcher = Matcher::new(MatchType::Regex, "le", r"1(\.0)?").unwrap();
        assert_eq!(matcher.to_string(), r#"le=~"1(\\.0)?""#);
        assert_eq!(Matcher::equal("job", "api").to_string(), r#"job="api""#);
        assert_eq!(
            Matcher::not_equal("path", "say \"hi\"").to_string(),
            r#"path!="say \"hi\"""#
        );
    }

    #[test]
    fn equality_ignores_compiled_regex() {
        let a = Matcher::new(MatchType::Regex, "code", "5..").unwrap();
        let b = Matcher::new(MatchType::Regex, "code", "5..").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Matcher::equal("code", "5.."));
    }

    #[test]
    fn quote_escapes_control_characters() {
        assert_eq!(quote("a\nb\tc"), r#""a\nb\tc""#);
        assert_eq!(quote("\u{01}"), r#""\x01""#);
    }
}
