//! Postgres-backed context store
//!
//! One JSONB row per conversation. Rows not updated for 24 hours are treated
//! as absent and removed on the next save.

use super::ContextStore;
use crate::context::ConversationContext;
use crate::error::AgentError;
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

const CONTEXT_TTL_HOURS: i32 = 24;

pub struct PostgresContextStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresContextStore {
    /// Build the pool without connecting; the first query connects.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| AgentError::DatabaseError(format!("Invalid database URL: {}", e)))?;

        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS conversation_contexts (
                      conversation_id TEXT PRIMARY KEY,
                      context JSONB NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_conversation_contexts_updated
                    ON conversation_contexts (updated_at);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AgentError::DatabaseError(format!("Failed to initialize context schema: {}", e))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl ContextStore for PostgresContextStore {
    async fn get(&self, conversation_id: &str) -> Result<ConversationContext> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            SELECT context
            FROM conversation_contexts
            WHERE conversation_id = $1
              AND updated_at > NOW() - make_interval(hours => $2)
            "#,
        )
        .bind(conversation_id)
        .bind(CONTEXT_TTL_HOURS)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AgentError::DatabaseError(format!("Failed to load context: {}", e)))?;

        let Some(row) = row else {
            debug!(conversation_id, "No stored context");
            return Ok(ConversationContext::new(conversation_id));
        };

        let raw: serde_json::Value = row
            .try_get("context")
            .map_err(|e| AgentError::DatabaseError(format!("Failed to read context: {}", e)))?;

        serde_json::from_value(raw)
            .map_err(|e| AgentError::StateError(format!("Stored context is invalid: {}", e)))
    }

    async fn save(&self, context: &ConversationContext) -> Result<()> {
        self.ensure_schema().await?;

        let value = serde_json::to_value(context)?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AgentError::DatabaseError(format!("Failed to begin context transaction: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO conversation_contexts (conversation_id, context, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (conversation_id)
            DO UPDATE SET context = EXCLUDED.context, updated_at = NOW()
            "#,
        )
        .bind(&context.conversation_id)
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(|e| AgentError::DatabaseError(format!("Failed to save context: {}", e)))?;

        sqlx::query(
            "DELETE FROM conversation_contexts WHERE updated_at <= NOW() - make_interval(hours => $1)",
        )
        .bind(CONTEXT_TTL_HOURS)
        .execute(&mut *tx)
        .await
        .map_err(|e| AgentError::DatabaseError(format!("Failed to expire contexts: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AgentError::DatabaseError(format!("Failed to commit context transaction: {}", e))
        })?;

        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM conversation_contexts WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AgentError::DatabaseError(format!("Failed to clear context: {}", e)))?;

        Ok(())
    }
}
