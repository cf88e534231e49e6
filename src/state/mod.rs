//! Conversation state persistence
//!
//! Contexts are loaded at the start of a request and saved at the end. The
//! in-memory store is the default; Postgres is used when a database URL is
//! configured.

pub mod postgres;

pub use postgres::PostgresContextStore;

use crate::config::Settings;
use crate::context::ConversationContext;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[async_trait::async_trait]
pub trait ContextStore: Send + Sync {
    /// The stored context, or a fresh one when the conversation is unknown.
    async fn get(&self, conversation_id: &str) -> Result<ConversationContext>;
    async fn save(&self, context: &ConversationContext) -> Result<()>;
    async fn clear(&self, conversation_id: &str) -> Result<()>;
}

/// In-memory context store for development and tests
pub struct InMemoryContextStore {
    contexts: Arc<RwLock<HashMap<String, ConversationContext>>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self {
            contexts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get(&self, conversation_id: &str) -> Result<ConversationContext> {
        let contexts = self.contexts.read().await;
        Ok(contexts
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| ConversationContext::new(conversation_id)))
    }

    async fn save(&self, context: &ConversationContext) -> Result<()> {
        let mut contexts = self.contexts.write().await;
        contexts.insert(context.conversation_id.clone(), context.clone());
        Ok(())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.contexts.write().await.remove(conversation_id);
        Ok(())
    }
}

/// Postgres when `DATABASE_URL` is set and usable, otherwise in-memory.
pub fn build_store(settings: &Settings) -> Arc<dyn ContextStore> {
    if let Some(url) = &settings.database_url {
        match PostgresContextStore::connect_lazy(url) {
            Ok(store) => {
                info!("Context store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres context store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Context store backend: in-memory");
    Arc::new(InMemoryContextStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent;

    #[tokio::test]
    async fn test_unknown_conversation_gets_fresh_context() {
        let store = InMemoryContextStore::new();
        let context = store.get("conv-1").await.unwrap();

        assert_eq!(context.conversation_id, "conv-1");
        assert!(context.messages.is_empty());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_save_get_clear() {
        let store = InMemoryContextStore::new();
        let mut context = store.get("conv-1").await.unwrap();
        context.record_query("hello", &intent::analyze("hello"));
        store.save(&context).await.unwrap();

        let loaded = store.get("conv-1").await.unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.metadata.interaction_count, 1);

        store.clear("conv-1").await.unwrap();
        assert!(store.get("conv-1").await.unwrap().messages.is_empty());
        store.clear("never-seen").await.unwrap();
    }

    #[tokio::test]
    async fn test_build_store_without_database_is_in_memory() {
        let store = build_store(&Settings::default());
        let context = store.get("x").await.unwrap();
        assert_eq!(context.conversation_id, "x");
    }
}
