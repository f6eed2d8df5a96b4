//! `SQLite` implementation of [`RuleStore`].

use std::str::FromStr;

use serde_json::Value;
use sqlx::SqlitePool;

use thingrules_app::ports::{RuleStore, StoredRow, StoredRule, UnreadableRule};
use thingrules_domain::error::ThingRulesError;
use thingrules_domain::id::RuleId;

use crate::error::StorageError;

/// `SQLite`-backed rule document store.
#[derive(Clone)]
pub struct SqliteRuleStore {
    pool: SqlitePool,
}

impl SqliteRuleStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl RuleStore for SqliteRuleStore {
    /// Rows with an unparsable id or document are returned as
    /// [`UnreadableRule`] so the caller can report them.
    async fn load_rules(&self) -> Result<Vec<StoredRow>, ThingRulesError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, description FROM rules ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;

        Ok(rows
            .into_iter()
            .map(|(key, description)| read_row(key, &description))
            .collect())
    }

    async fn save_rule(&self, id: RuleId, document: &Value) -> Result<(), ThingRulesError> {
        let description = serde_json::to_string(document).map_err(StorageError::from)?;
        sqlx::query(
            "INSERT INTO rules (id, description) VALUES (?, ?) \
             ON CONFLICT(id) DO UPDATE SET description = excluded.description",
        )
        .bind(id.to_string())
        .bind(&description)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn delete_rule(&self, id: RuleId) -> Result<(), ThingRulesError> {
        sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

fn read_row(key: String, description: &str) -> StoredRow {
    let Ok(id) = RuleId::from_str(&key) else {
        let error = StorageError::InvalidId(key.clone()).into();
        return Err(UnreadableRule { key, error });
    };
    match serde_json::from_str::<Value>(description) {
        Ok(document) => Ok(StoredRule { id, document }),
        Err(error) => Err(UnreadableRule {
            key,
            error: StorageError::from(error).into(),
        }),
    }
}
