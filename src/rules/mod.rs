//! Declarative markup rewriting
//!
//! This module handles:
//! - Loading and validating the rule document (TOML)
//! - Matching attribute tokens, including `TOKEN(.*)` wildcards
//! - Applying rules in order to a parsed fragment
//!
//! A [`RuleSet`] is immutable once loaded and is shared between workers
//! behind an `Arc`.

pub mod matcher;
mod rewriter;
mod types;

pub use matcher::{TokenMatch, TokenPattern};
pub use rewriter::{apply_rules, rewrite_fragment};
pub use types::{
    AttributeRequirement, Disposition, RewriteRule, RuleAction, RuleDocument, RuleMatch, RuleSpec,
};

use crate::RuleResult;
use std::path::Path;

/// Ordered, validated rewrite rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    /// Loads a rule document from disk
    pub fn load(path: &Path) -> RuleResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates a rule document
    ///
    /// The first malformed rule aborts loading, so no harvest starts with a
    /// rule set that would only partially apply.
    pub fn from_toml(content: &str) -> RuleResult<Self> {
        let document: RuleDocument = toml::from_str(content)?;
        let rules = document
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, spec)| RewriteRule::from_spec(index, spec))
            .collect::<RuleResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RewriteRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
