//! Glob patterns over cache keys (`*` and `?` wildcards).

use crate::{Error, ErrorContext, Result};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');
        let regex = Regex::new(&expr).map_err(|e| {
            Error::validation_with_context(
                format!("invalid glob pattern '{}'", pattern),
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("glob"),
            )
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// Longest wildcard-free leading segment, used to narrow backend scans.
    pub fn literal_prefix(&self) -> &str {
        let end = self
            .raw
            .find(|c| c == '*' || c == '?')
            .unwrap_or(self.raw.len());
        &self.raw[..end]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_question_mark() {
        let g = GlobPattern::new("mg:geocoding:*").unwrap();
        assert!(g.matches("mg:geocoding:abc"));
        assert!(!g.matches("mg:routes:abc"));

        let g = GlobPattern::new("a?c").unwrap();
        assert!(g.matches("abc"));
        assert!(!g.matches("abbc"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let g = GlobPattern::new("key.(1)+").unwrap();
        assert!(g.matches("key.(1)+"));
        assert!(!g.matches("keyx(1)+"));
    }

    #[test]
    fn literal_prefix_stops_at_wildcard() {
        assert_eq!(GlobPattern::new("mg:routes:*").unwrap().literal_prefix(), "mg:routes:");
        assert_eq!(GlobPattern::new("*").unwrap().literal_prefix(), "");
        assert_eq!(GlobPattern::new("exact").unwrap().literal_prefix(), "exact");
    }
}
