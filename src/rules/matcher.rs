//! Attribute token matching for rewrite rules
//!
//! A required token is either a literal, which must appear verbatim among
//! the node's whitespace-separated attribute tokens, or a wildcard such as
//! `crossref(.*)`. Wildcards are regular expressions with exactly one
//! capture group; they match when the pattern is found anywhere inside one
//! of the node's tokens, and the group's text becomes the capture.

use crate::{RuleError, RuleResult};
use regex::Regex;

/// One required attribute token
#[derive(Debug, Clone)]
pub enum TokenPattern {
    Literal(String),
    Wildcard(Regex),
}

/// Successful match of a token pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch {
    /// Text captured by a wildcard, `None` for literals
    pub capture: Option<String>,
}

impl TokenPattern {
    /// Parses a required token
    ///
    /// Tokens containing a parenthesised group are treated as wildcards and
    /// must compile to a pattern with exactly one capture group.
    pub fn parse(token: &str) -> RuleResult<Self> {
        if !token.contains('(') {
            return Ok(Self::Literal(token.to_string()));
        }

        let regex = Regex::new(token).map_err(|source| RuleError::Pattern {
            token: token.to_string(),
            source,
        })?;

        // captures_len counts the implicit whole-match group
        if regex.captures_len() != 2 {
            return Err(RuleError::CaptureGroups {
                token: token.to_string(),
                found: regex.captures_len() - 1,
            });
        }

        Ok(Self::Wildcard(regex))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard(_))
    }

    /// Looks for this pattern among a node's attribute tokens
    pub fn find<'a, I>(&self, tokens: I) -> Option<TokenMatch>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            Self::Literal(literal) => tokens
                .into_iter()
                .any(|token| token == literal)
                .then_some(TokenMatch { capture: None }),
            Self::Wildcard(regex) => tokens.into_iter().find_map(|token| {
                regex.captures(token).map(|caps| TokenMatch {
                    capture: Some(
                        caps.get(1)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default(),
                    ),
                })
            }),
        }
    }
}

/// Fills the `{}` placeholder of a replacement value with a wildcard capture
pub fn substitute(template: &str, capture: &str) -> String {
    template.replace("{}", capture)
}
