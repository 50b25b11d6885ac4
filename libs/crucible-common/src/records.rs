use crate::types::ExecutionRecord;
use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};

/// Redis key semantics for execution records and context documents.
/// Deterministic keys keep the server and the surrounding application
/// from drifting.

pub const EXECUTION_PREFIX: &str = "crucible:executions";
pub const CONTEXT_PREFIX: &str = "crucible:context";

/// The latest-record pointer expires; the append-only history does not.
const LATEST_TTL_SECS: u64 = 86400;

/// Append-only execution history for a context.
pub fn history_key(context_id: &str) -> String {
    format!("{}:{}", EXECUTION_PREFIX, context_id)
}

/// Most-recent-execution pointer for a context.
pub fn latest_key(context_id: &str) -> String {
    format!("{}:{}:latest", EXECUTION_PREFIX, context_id)
}

/// Context document written by the surrounding application.
pub fn context_key(context_id: &str) -> String {
    format!("{}:{}", CONTEXT_PREFIX, context_id)
}

/// Append one execution record. RPUSH keeps the history in attempt order;
/// the latest pointer is refreshed for quick lookups.
pub async fn append_record(
    conn: &mut redis::aio::ConnectionManager,
    record: &ExecutionRecord,
) -> RedisResult<()> {
    let payload = serde_json::to_string(record).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
    })?;

    let _: () = conn.rpush(history_key(&record.context_id), &payload).await?;
    let _: () = conn
        .set_ex(latest_key(&record.context_id), payload, LATEST_TTL_SECS)
        .await?;

    Ok(())
}

/// Retrieve the most recent execution record for a context, falling back
/// to the tail of the history list when the latest pointer has expired.
pub async fn latest_record(
    conn: &mut redis::aio::ConnectionManager,
    context_id: &str,
) -> RedisResult<Option<ExecutionRecord>> {
    let payload: Option<String> = conn.get(latest_key(context_id)).await?;
    let payload = match payload {
        Some(data) => Some(data),
        None => conn.lindex(history_key(context_id), -1).await?,
    };

    match payload {
        Some(data) => {
            let record: ExecutionRecord = serde_json::from_str(&data).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Destination for finished execution records. Persistence is best-effort
/// from the orchestrator's point of view; failures are logged there and
/// never alter the computed result.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(&self, record: &ExecutionRecord) -> Result<()>;
}

pub struct RedisRecordSink {
    conn: redis::aio::ConnectionManager,
}

impl RedisRecordSink {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        RedisRecordSink { conn }
    }
}

#[async_trait]
impl RecordSink for RedisRecordSink {
    async fn append(&self, record: &ExecutionRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        append_record(&mut conn, record).await?;
        Ok(())
    }
}
