//! Rule evaluation over a mutable document tree
//!
//! Rules run one after another over the fragment. Each rule collects its
//! matches before touching the tree, so every matched node is acted on once
//! per pass, and the next rule sees the tree as the previous one left it.

use crate::rules::matcher::substitute;
use crate::rules::types::{Disposition, RewriteRule};
use crate::rules::RuleSet;
use kuchiki::traits::*;
use kuchiki::NodeRef;

/// Applies the rule set to a markup fragment and serializes the result
///
/// The fragment's root element is itself eligible for matching.
pub fn rewrite_fragment(fragment: &str, rules: &RuleSet) -> String {
    let document = kuchiki::parse_html().one(fragment);

    let body = match document.select_first("body") {
        Ok(body) => body.as_node().clone(),
        Err(()) => return fragment.to_string(),
    };

    apply_rules(&body, rules);

    body.children().map(|child| child.to_string()).collect()
}

/// Runs every rule, in load order, over the descendants of `container`
pub fn apply_rules(container: &NodeRef, rules: &RuleSet) {
    for rule in rules.iter() {
        let matched: Vec<(NodeRef, Option<String>)> = container
            .descendants()
            .elements()
            .filter_map(|element| {
                let attributes = element.attributes.borrow();
                let found = rule.matches(&element.name.local, |name| attributes.get(name))?;
                Some((element.as_node().clone(), found.capture))
            })
            .collect();

        if !matched.is_empty() {
            tracing::trace!("Rule <{}> matched {} nodes", rule.tag, matched.len());
        }

        for (node, capture) in matched {
            apply_rule(node, rule, capture.as_deref());
        }
    }
}

/// Applies one rule's actions to a matched node
///
/// Order: remove, unwrap, set attributes, rename, remove attributes.
fn apply_rule(node: NodeRef, rule: &RewriteRule, capture: Option<&str>) {
    match rule.disposition {
        Disposition::Remove => {
            node.detach();
            return;
        }
        Disposition::Unwrap => {
            for child in node.children().collect::<Vec<_>>() {
                node.insert_before(child);
            }
            node.detach();
            return;
        }
        Disposition::Edit => {}
    }

    if let Some(element) = node.as_element() {
        let mut attributes = element.attributes.borrow_mut();
        for (name, value) in &rule.set_attributes {
            attributes.insert(name.as_str(), value.clone());
        }
        let capture = capture.unwrap_or_default();
        for (name, template) in &rule.wildcard_attributes {
            attributes.insert(name.as_str(), substitute(template, capture));
        }
    }

    let node = match &rule.rename {
        Some(tag) => rename(node, tag),
        None => node,
    };

    if let Some(element) = node.as_element() {
        let mut attributes = element.attributes.borrow_mut();
        for name in &rule.remove_attributes {
            attributes.remove(name.as_str());
        }
    }
}

/// Replaces an element with a copy under a new tag name
///
/// Children and attributes move to the new element, which takes the old
/// one's place in the tree.
fn rename(node: NodeRef, tag: &str) -> NodeRef {
    let Some(element) = node.as_element() else {
        return node;
    };

    if &*element.name.local == tag {
        return node;
    }

    let mut name = element.name.clone();
    name.local = tag.into();
    let attributes = element.attributes.borrow().map.clone();

    let renamed = NodeRef::new_element(name, attributes);
    for child in node.children().collect::<Vec<_>>() {
        renamed.append(child);
    }
    node.insert_before(renamed.clone());
    node.detach();
    renamed
}
