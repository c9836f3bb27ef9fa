//! Seeds the built-in learning materials into an empty database.

use sqlx::types::Json;
use sqlx::Row;
use tracing::info;

use crate::store::PgStore;
use parlo_core::materials::{default_grammar_rules, default_pronunciation, default_vocabulary};
use parlo_core::store::StoreError;

/// Inserts the default material corpus into any table that is still empty.
/// Re-running against a populated database is a no-op.
pub async fn seed_materials(store: &PgStore) -> Result<(), StoreError> {
    let pool = store.pool();

    if table_is_empty(pool, "grammar_rules").await? {
        let rules = default_grammar_rules();
        for rule in &rules {
            sqlx::query(
                "INSERT INTO grammar_rules (topic, level, content, examples, common_mistakes) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&rule.topic)
            .bind(rule.level.as_str())
            .bind(&rule.content)
            .bind(Json(&rule.examples))
            .bind(Json(&rule.common_mistakes))
            .execute(pool)
            .await
            .map_err(StoreError::backend)?;
        }
        info!(count = rules.len(), "seeded grammar rules");
    }

    if table_is_empty(pool, "vocabulary").await? {
        let items = default_vocabulary();
        for item in &items {
            sqlx::query(
                "INSERT INTO vocabulary (word, definition, level, usage_example, pronunciation, topic) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&item.word)
            .bind(&item.definition)
            .bind(item.level.as_str())
            .bind(&item.usage)
            .bind(&item.pronunciation)
            .bind(&item.topic)
            .execute(pool)
            .await
            .map_err(StoreError::backend)?;
        }
        info!(count = items.len(), "seeded vocabulary");
    }

    if table_is_empty(pool, "pronunciation").await? {
        let guides = default_pronunciation();
        for guide in &guides {
            sqlx::query(
                "INSERT INTO pronunciation (word, phonetic, common_mistakes, tips) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&guide.word)
            .bind(&guide.phonetic)
            .bind(&guide.common_mistakes)
            .bind(&guide.tips)
            .execute(pool)
            .await
            .map_err(StoreError::backend)?;
        }
        info!(count = guides.len(), "seeded pronunciation guides");
    }

    Ok(())
}

async fn table_is_empty(pool: &sqlx::PgPool, table: &str) -> Result<bool, StoreError> {
    // Table names come from the fixed list above, never from input.
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
        .fetch_one(pool)
        .await
        .map_err(StoreError::backend)?;
    let count: i64 = row.try_get("n").map_err(StoreError::backend)?;
    Ok(count == 0)
}
