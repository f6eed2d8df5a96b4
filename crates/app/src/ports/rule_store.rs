//! Rule store port: persistence of raw rule documents.
//!
//! The store deals in JSON documents, not [`Rule`](thingrules_domain::rule::Rule)s:
//! documents may be in a legacy format and are only parsed after migration.

use std::future::Future;

use serde_json::Value;
use thingrules_domain::error::ThingRulesError;
use thingrules_domain::id::RuleId;

/// A persisted rule document together with the id it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRule {
    pub id: RuleId,
    pub document: Value,
}

/// A stored row whose key or document could not be read.
#[derive(Debug)]
pub struct UnreadableRule {
    /// The key the row is stored under, verbatim.
    pub key: String,
    pub error: ThingRulesError,
}

/// One row returned by [`RuleStore::load_rules`].
pub type StoredRow = Result<StoredRule, UnreadableRule>;

/// Repository for rule documents.
pub trait RuleStore {
    /// Load every stored rule document.
    ///
    /// A row that cannot be read is returned as an [`UnreadableRule`] so the
    /// caller can report it; only a failure to read the store as a whole is
    /// an error.
    fn load_rules(&self) -> impl Future<Output = Result<Vec<StoredRow>, ThingRulesError>> + Send;

    /// Insert or replace the document stored under `id`.
    fn save_rule(
        &self,
        id: RuleId,
        document: &Value,
    ) -> impl Future<Output = Result<(), ThingRulesError>> + Send;

    /// Remove the document stored under `id`. Removing a missing id is not an error.
    fn delete_rule(&self, id: RuleId) -> impl Future<Output = Result<(), ThingRulesError>> + Send;
}

impl<T: RuleStore + Send + Sync> RuleStore for std::sync::Arc<T> {
    fn load_rules(&self) -> impl Future<Output = Result<Vec<StoredRow>, ThingRulesError>> + Send {
        (**self).load_rules()
    }

    fn save_rule(
        &self,
        id: RuleId,
        document: &Value,
    ) -> impl Future<Output = Result<(), ThingRulesError>> + Send {
        (**self).save_rule(id, document)
    }

    fn delete_rule(&self, id: RuleId) -> impl Future<Output = Result<(), ThingRulesError>> + Send {
        (**self).delete_rule(id)
    }
}
