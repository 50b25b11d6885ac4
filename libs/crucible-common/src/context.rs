use crate::records::context_key;
use crate::types::ExecutionContext;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use redis::AsyncCommands;

/// Read-only source of context documents (state + ordered test cases).
/// Authoring and lifecycle management live in the surrounding application;
/// this side only fetches.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch(&self, context_id: &str) -> Result<Option<ExecutionContext>>;
}

pub struct RedisContextSource {
    conn: redis::aio::ConnectionManager,
}

impl RedisContextSource {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        RedisContextSource { conn }
    }
}

#[async_trait]
impl ContextSource for RedisContextSource {
    async fn fetch(&self, context_id: &str) -> Result<Option<ExecutionContext>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .get(context_key(context_id))
            .await
            .context("Failed to fetch context document")?;

        match payload {
            Some(raw) => {
                let context: ExecutionContext =
                    serde_json::from_str(&raw).context("Failed to parse context document")?;
                Ok(Some(context))
            }
            None => Ok(None),
        }
    }
}
