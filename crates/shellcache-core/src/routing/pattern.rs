//! Glob-style URL patterns
//!
//! Patterns are matched against `host[:port]/path` of a URL. `*` matches any
//! run of characters within one segment, `**` matches across segments.

use url::Url;

use crate::error::CoreError;

/// Maximum iterations allowed for pattern matching to prevent ReDoS
const MAX_MATCH_ITERATIONS: usize = 10000;

/// Maximum pattern length accepted from configuration
const MAX_PATTERN_LENGTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternPart {
    /// Literal text that must match exactly
    Literal(String),
    /// Single segment wildcard (*)
    SingleWildcard,
    /// Multi-segment wildcard (**)
    MultiWildcard,
}

/// A compiled URL pattern
#[derive(Debug, Clone)]
pub struct UrlPattern {
    parts: Vec<PatternPart>,
}

/// The portion of a URL that patterns are matched against
pub fn match_target(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}{}", host, port, url.path()),
        None => format!("{}{}", host, url.path()),
    }
}

impl UrlPattern {
    /// Compile a pattern, rejecting empty, oversized or malformed input
    pub fn new(pattern: &str) -> Result<Self, CoreError> {
        if pattern.is_empty() {
            return Err(CoreError::InvalidPattern("Pattern cannot be empty".to_string()));
        }
        if pattern.len() > MAX_PATTERN_LENGTH {
            return Err(CoreError::InvalidPattern(format!(
                "Pattern exceeds {} characters",
                MAX_PATTERN_LENGTH
            )));
        }
        if pattern.contains("***") {
            return Err(CoreError::InvalidPattern(format!(
                "Pattern '{}' contains '***'",
                pattern
            )));
        }
        if pattern.contains("://") || pattern.contains('?') {
            return Err(CoreError::InvalidPattern(format!(
                "Pattern '{}' must not contain a scheme or query",
                pattern
            )));
        }

        Ok(Self {
            parts: Self::compile(pattern),
        })
    }

    fn compile(pattern: &str) -> Vec<PatternPart> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch != '*' {
                current.push(ch);
                continue;
            }

            if !current.is_empty() {
                parts.push(PatternPart::Literal(std::mem::take(&mut current)));
            }

            if chars.peek() == Some(&'*') {
                chars.next();
                parts.push(PatternPart::MultiWildcard);
            } else {
                parts.push(PatternPart::SingleWildcard);
            }
        }

        if !current.is_empty() {
            parts.push(PatternPart::Literal(current));
        }

        parts
    }

    /// Check the pattern against a URL
    pub fn matches_url(&self, url: &Url) -> bool {
        self.matches(&match_target(url))
    }

    /// Check the pattern against a `host[:port]/path` string
    pub fn matches(&self, target: &str) -> bool {
        let mut iterations = 0;
        Self::match_recursive(&self.parts, target.as_bytes(), &mut iterations)
    }

    fn match_recursive(parts: &[PatternPart], rest: &[u8], iterations: &mut usize) -> bool {
        *iterations += 1;
        if *iterations > MAX_MATCH_ITERATIONS {
            tracing::warn!(
                "Pattern matching exceeded {} iterations, aborting",
                MAX_MATCH_ITERATIONS
            );
            return false;
        }

        let Some((part, remaining_parts)) = parts.split_first() else {
            return rest.is_empty();
        };

        match part {
            PatternPart::Literal(lit) => rest
                .strip_prefix(lit.as_bytes())
                .is_some_and(|tail| Self::match_recursive(remaining_parts, tail, iterations)),
            PatternPart::SingleWildcard => {
                // Any prefix up to (not including) the next '/'
                let segment_end = rest.iter().position(|&b| b == b'/').unwrap_or(rest.len());
                (0..=segment_end)
                    .any(|i| Self::match_recursive(remaining_parts, &rest[i..], iterations))
            }
            PatternPart::MultiWildcard => {
                if remaining_parts.is_empty() {
                    return true;
                }
                (0..=rest.len())
                    .any(|i| Self::match_recursive(remaining_parts, &rest[i..], iterations))
            }
        }
    }
}
