use crate::rules::matcher::{TokenMatch, TokenPattern};
use crate::{RuleError, RuleResult};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One action of a rewrite rule, as written in the rule document
///
/// ```toml
/// [[rule]]
/// tag = "span"
/// attributes = { class = "text Gen-(.*)" }
/// actions = [
///     { kind = "rewrite-wildcard", values = { id = "verse-{}" } },
///     { kind = "rename", to = "p" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RuleAction {
    /// Delete the node and its subtree
    Remove,

    /// Replace the node with its children
    Unwrap,

    /// Change the tag name
    Rename { to: String },

    /// Set or replace attributes with literal values
    SetAttributes { values: BTreeMap<String, String> },

    /// Delete the named attributes
    RemoveAttributes { names: Vec<String> },

    /// Set attributes whose values embed the wildcard capture at `{}`
    RewriteWildcard { values: BTreeMap<String, String> },
}

impl RuleAction {
    fn kind(&self) -> &'static str {
        match self {
            Self::Remove => "remove",
            Self::Unwrap => "unwrap",
            Self::Rename { .. } => "rename",
            Self::SetAttributes { .. } => "set-attributes",
            Self::RemoveAttributes { .. } => "remove-attributes",
            Self::RewriteWildcard { .. } => "rewrite-wildcard",
        }
    }
}

/// A rule as deserialized, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub tag: String,

    /// Attribute name → space-separated required tokens
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    pub actions: Vec<RuleAction>,
}

/// Top-level rule document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDocument {
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleSpec>,
}

/// Required tokens for one attribute
#[derive(Debug, Clone)]
pub struct AttributeRequirement {
    pub name: String,
    pub tokens: Vec<TokenPattern>,
}

/// What happens to a node that matches, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Disposition {
    /// Delete the node and its subtree
    Remove,

    /// Replace the node with its children
    Unwrap,

    /// Keep the node and edit it
    #[default]
    Edit,
}

/// A validated rewrite rule
///
/// Matching is strict: every required attribute must be present and every
/// required token must be found among that attribute's tokens.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    /// Lowercase tag name the rule selects
    pub tag: String,
    pub requirements: Vec<AttributeRequirement>,
    pub disposition: Disposition,
    pub set_attributes: BTreeMap<String, String>,
    pub wildcard_attributes: BTreeMap<String, String>,
    pub rename: Option<String>,
    pub remove_attributes: Vec<String>,
}

/// Result of matching a rule against a node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleMatch {
    /// First wildcard capture, if the rule has a wildcard token
    pub capture: Option<String>,
}

impl RewriteRule {
    /// Validates a deserialized rule
    ///
    /// Rejects empty tags, empty or duplicated actions, actions that can
    /// never run next to `remove`/`unwrap`, and wildcard rewrites without
    /// exactly one wildcard token to capture from.
    pub fn from_spec(index: usize, spec: RuleSpec) -> RuleResult<Self> {
        let invalid = |message: String| RuleError::Invalid {
            index,
            tag: spec.tag.clone(),
            message,
        };

        let tag = spec.tag.trim().to_ascii_lowercase();
        if !is_valid_name(&tag) {
            return Err(invalid(format!("'{}' is not a valid tag name", spec.tag)));
        }

        if spec.actions.is_empty() {
            return Err(invalid("rule has no actions".to_string()));
        }

        let mut seen = Vec::new();
        for action in &spec.actions {
            if seen.contains(&action.kind()) {
                return Err(invalid(format!("duplicate '{}' action", action.kind())));
            }
            seen.push(action.kind());
        }

        let terminal = seen.iter().any(|k| *k == "remove" || *k == "unwrap");
        if terminal && seen.len() > 1 {
            return Err(invalid(
                "'remove' and 'unwrap' cannot be combined with other actions".to_string(),
            ));
        }

        let mut requirements = Vec::new();
        for (name, tokens) in &spec.attributes {
            let name = name.trim().to_ascii_lowercase();
            if !is_valid_name(&name) {
                return Err(invalid(format!("'{}' is not a valid attribute name", name)));
            }
            let tokens = tokens
                .split_whitespace()
                .map(TokenPattern::parse)
                .collect::<RuleResult<Vec<_>>>()?;
            requirements.push(AttributeRequirement { name, tokens });
        }

        let mut rule = Self {
            tag,
            requirements,
            disposition: Disposition::Edit,
            set_attributes: BTreeMap::new(),
            wildcard_attributes: BTreeMap::new(),
            rename: None,
            remove_attributes: Vec::new(),
        };

        for action in spec.actions.iter().cloned() {
            match action {
                RuleAction::Remove => rule.disposition = Disposition::Remove,
                RuleAction::Unwrap => rule.disposition = Disposition::Unwrap,
                RuleAction::Rename { to } => {
                    let to = to.trim().to_ascii_lowercase();
                    if !is_valid_name(&to) {
                        return Err(invalid(format!("cannot rename to '{}'", to)));
                    }
                    rule.rename = Some(to);
                }
                RuleAction::SetAttributes { values } => {
                    check_attribute_names(values.keys(), &invalid)?;
                    rule.set_attributes = values;
                }
                RuleAction::RemoveAttributes { names } => {
                    check_attribute_names(names.iter(), &invalid)?;
                    rule.remove_attributes = names;
                }
                RuleAction::RewriteWildcard { values } => {
                    let wildcards = rule
                        .requirements
                        .iter()
                        .flat_map(|r| r.tokens.iter())
                        .filter(|t| t.is_wildcard())
                        .count();
                    if wildcards != 1 {
                        return Err(invalid(format!(
                            "'rewrite-wildcard' needs exactly one wildcard token, found {}",
                            wildcards
                        )));
                    }
                    check_attribute_names(values.keys(), &invalid)?;
                    rule.wildcard_attributes = values;
                }
            }
        }

        Ok(rule)
    }

    /// Matches the rule against a node
    ///
    /// `tag` is the node's local name and `attribute` looks up an attribute
    /// value by name.
    pub fn matches<'a, F>(&self, tag: &str, attribute: F) -> Option<RuleMatch>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        if !tag.eq_ignore_ascii_case(&self.tag) {
            return None;
        }

        let mut result = RuleMatch::default();
        for requirement in &self.requirements {
            let value = attribute(&requirement.name)?;
            for pattern in &requirement.tokens {
                let TokenMatch { capture } = pattern.find(value.split_whitespace())?;
                if result.capture.is_none() {
                    result.capture = capture;
                }
            }
        }

        Some(result)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}

fn check_attribute_names<'a, I, F>(names: I, invalid: &F) -> RuleResult<()>
where
    I: IntoIterator<Item = &'a String>,
    F: Fn(String) -> RuleError,
{
    for name in names {
        if !is_valid_name(name) {
            return Err(invalid(format!("'{}' is not a valid attribute name", name)));
        }
    }
    Ok(())
}
