//! Session storage backends.

use crate::error::SessionResult;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage of session data by session id.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Stored data of `id`; an empty object for unknown ids.
    async fn get(&self, id: &str) -> SessionResult<Value>;

    /// Store `session` under `id`. `previous` is the data loaded at the
    /// start of the request, or `None` when the id is new.
    async fn set(&self, id: &str, session: Value, previous: Option<Value>) -> SessionResult<()>;

    /// Forget a session.
    async fn delete(&self, id: &str) -> SessionResult<()>;
}

/// Process-local session storage.
#[derive(Debug, Default)]
pub struct InMemorySessionStorage {
    sessions: RwLock<HashMap<String, Value>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store data directly, e.g. to seed a session.
    pub async fn insert(&self, id: impl Into<String>, session: Value) {
        self.sessions.write().await.insert(id.into(), session);
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn get(&self, id: &str) -> SessionResult<Value> {
        Ok(self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    async fn set(&self, id: &str, session: Value, _previous: Option<Value>) -> SessionResult<()> {
        self.sessions.write().await.insert(id.to_string(), session);
        debug!("Session stored in memory");
        Ok(())
    }

    async fn delete(&self, id: &str) -> SessionResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}
