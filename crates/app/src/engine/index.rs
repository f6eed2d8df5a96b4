//! Reverse index from trigger references to the rules that hold them.

use std::collections::{BTreeSet, HashMap};

use thingrules_domain::id::RuleId;
use thingrules_domain::rule::Reference;

/// Maps each [`Reference`] to the ids of the rules whose trigger tree uses it.
///
/// Only enabled rules are indexed. Entries are maintained per rule, so
/// re-indexing one rule never scans the others.
#[derive(Debug, Default)]
pub struct ReverseIndex {
    by_reference: HashMap<Reference, BTreeSet<RuleId>>,
    by_rule: HashMap<RuleId, Vec<Reference>>,
}

impl ReverseIndex {
    /// Index `rule` under `references`, replacing any previous entries.
    pub fn insert(&mut self, rule: RuleId, references: Vec<Reference>) {
        self.remove(rule);
        for reference in &references {
            self.by_reference
                .entry(reference.clone())
                .or_default()
                .insert(rule);
        }
        self.by_rule.insert(rule, references);
    }

    /// Drop every entry of `rule`.
    pub fn remove(&mut self, rule: RuleId) {
        let Some(references) = self.by_rule.remove(&rule) else {
            return;
        };
        for reference in references {
            if let Some(rules) = self.by_reference.get_mut(&reference) {
                rules.remove(&rule);
                if rules.is_empty() {
                    self.by_reference.remove(&reference);
                }
            }
        }
    }

    /// Rules indexed under `reference`, in id order.
    #[must_use]
    pub fn lookup(&self, reference: &Reference) -> BTreeSet<RuleId> {
        self.by_reference.get(reference).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, rule: RuleId) -> bool {
        self.by_rule.contains_key(&rule)
    }

    /// Number of indexed rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_rule.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_rule.is_empty()
    }
}
