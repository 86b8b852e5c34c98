// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection legality rules.
//!
//! Rules are keyed by the source node's type tag. A source type with no
//! registered rule may connect to anything.

use crate::connection::PortRef;
use crate::narrative::{CHOICE_NODE_TYPE, CONDITION_NODE_TYPE, TEXT_NODE_TYPE};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Decides whether `target` may be linked from `source`, given the
/// targets already linked from that same output port.
pub type ConnectionRule = Arc<dyn Fn(&PortRef, &PortRef, &[PortRef]) -> bool + Send + Sync>;

/// Table of connection rules keyed by source type tag
#[derive(Clone, Default)]
pub struct ConnectionValidator {
    rules: IndexMap<String, ConnectionRule>,
}

impl fmt::Debug for ConnectionValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionValidator")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConnectionValidator {
    /// Create a validator with no rules; every connection is allowed
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a validator with the built-in narrative rules
    pub fn narrative() -> Self {
        let mut validator = Self::new();
        validator.register_rule(TEXT_NODE_TYPE, Arc::new(text_rule));
        validator.register_rule(CHOICE_NODE_TYPE, Arc::new(choice_rule));
        validator.register_rule(CONDITION_NODE_TYPE, Arc::new(condition_rule));
        validator
    }

    /// Register or replace the rule for a source type tag
    pub fn register_rule(&mut self, source_type: impl Into<String>, rule: ConnectionRule) {
        self.rules.insert(source_type.into(), rule);
    }

    /// Remove the rule for a source type tag
    pub fn remove_rule(&mut self, source_type: &str) -> bool {
        self.rules.shift_remove(source_type).is_some()
    }

    /// Whether a rule is registered for a source type tag
    pub fn has_rule(&self, source_type: &str) -> bool {
        self.rules.contains_key(source_type)
    }

    /// Check whether a candidate link is structurally legal.
    ///
    /// `existing` holds the targets already linked from `source`.
    pub fn can_connect(&self, source: &PortRef, target: &PortRef, existing: &[PortRef]) -> bool {
        let Some(rule) = self.rules.get(&source.type_tag) else {
            return true;
        };

        let allowed = rule(source, target, existing);
        if !allowed {
            tracing::debug!(
                "Rejected link {}.{}[{}] -> {}",
                source.type_tag,
                source.port_name,
                source.port_index,
                target.type_tag
            );
        }
        allowed
    }
}

/// Text output: one text successor, or any number of choices, never both.
fn text_rule(_source: &PortRef, target: &PortRef, existing: &[PortRef]) -> bool {
    let links_text = existing.iter().any(|p| p.type_tag == TEXT_NODE_TYPE);
    let links_choice = existing.iter().any(|p| p.type_tag == CHOICE_NODE_TYPE);

    match target.type_tag.as_str() {
        TEXT_NODE_TYPE => !links_text && !links_choice,
        CHOICE_NODE_TYPE => !links_text,
        _ => true,
    }
}

fn choice_rule(_source: &PortRef, target: &PortRef, _existing: &[PortRef]) -> bool {
    target.type_tag != CHOICE_NODE_TYPE
}

fn condition_rule(_source: &PortRef, target: &PortRef, _existing: &[PortRef]) -> bool {
    matches!(target.type_tag.as_str(), TEXT_NODE_TYPE | CHOICE_NODE_TYPE)
}
