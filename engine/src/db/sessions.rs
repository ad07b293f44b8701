/// Session persistence
///
/// A session is a conversation: an append-only transcript plus the state of
/// its most recent run. The transcript lives in `session_messages`, one row
/// per message, and rows are never updated or deleted. The run state lives in
/// `session_runs` as JSON and is overwritten on every save.
use crate::conductor::types::{ChatMessage, ChatRole, RunState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::RunStatus;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Load/save contract used by the run controller
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Latest run state of a session, with the full transcript
    async fn load(&self, session_id: &str) -> Result<Option<RunState>>;

    /// Persist a run state; transcript entries are only ever appended
    async fn save(&self, session_id: &str, state: &RunState) -> Result<()>;
}

fn status_str(outcome: Option<RunStatus>) -> &'static str {
    match outcome {
        None => "running",
        Some(RunStatus::Ok) => "ok",
        Some(RunStatus::Aborted) => "aborted",
    }
}

/// SQLite-backed session store
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Transcript of a session in append order
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT role, content FROM session_messages WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch session messages")?;

        rows.into_iter()
            .map(|r| {
                let role: String = r.get("role");
                Ok(ChatMessage {
                    role: ChatRole::from_str(&role).map_err(anyhow::Error::msg)?,
                    content: r.get("content"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<RunState>> {
        let transcript = self.transcript(session_id).await?;

        let row = sqlx::query("SELECT state FROM session_runs WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch session run")?;

        let state = match row {
            Some(row) => {
                let json: String = row.get("state");
                let mut state: RunState =
                    serde_json::from_str(&json).context("Failed to decode stored run state")?;
                state.transcript = transcript;
                Some(state)
            }
            None if transcript.is_empty() => None,
            None => Some(RunState::new("", transcript)),
        };

        Ok(state)
    }

    async fn save(&self, session_id: &str, state: &RunState) -> Result<()> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let stored: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM session_messages WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to count session messages")?;

        for (seq, message) in state
            .transcript
            .iter()
            .enumerate()
            .skip(stored.max(0) as usize)
        {
            sqlx::query(
                "INSERT INTO session_messages (session_id, seq, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(seq as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to append session message")?;
        }

        // The transcript is stored row by row; keep it out of the state blob
        let mut snapshot = state.clone();
        snapshot.transcript.clear();
        let json = serde_json::to_string(&snapshot).context("Failed to encode run state")?;

        sqlx::query(
            "INSERT INTO session_runs (session_id, status, state, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET status = excluded.status, state = excluded.state, updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(status_str(state.outcome))
        .bind(json)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to save session run")?;

        tx.commit().await.context("Failed to commit session save")?;
        Ok(())
    }
}

/// In-memory session store for tests and one-shot CLI runs
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, RunState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<RunState>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))?;
        Ok(sessions.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, state: &RunState) -> Result<()> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("Session store lock poisoned"))?;

        let mut state = state.clone();
        if let Some(previous) = sessions.get(session_id) {
            // Never shrink the transcript
            if previous.transcript.len() > state.transcript.len() {
                state.transcript = previous.transcript.clone();
            }
        }
        sessions.insert(session_id.to_string(), state);
        Ok(())
    }
}
