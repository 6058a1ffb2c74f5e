use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::core::errors::ApiError;

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Opens (creating when needed) the database at `database_url` and
    /// ensures the schema exists.
    pub async fn new(database_url: &str) -> Result<Self, ApiError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to history db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init sessions table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init messages table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<SessionInfo, ApiError> {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
        let session = SessionInfo {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        sqlx::query("INSERT INTO sessions (id, title, created_at) VALUES (?, ?, ?)")
            .bind(&session.id)
            .bind(&session.title)
            .bind(&session.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create session: {}", e)))?;

        Ok(session)
    }

    /// Newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, title, created_at FROM sessions ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(SessionInfo {
                id: row.try_get("id").map_err(ApiError::internal)?,
                title: row.try_get("title").map_err(ApiError::internal)?,
                created_at: row.try_get("created_at").map_err(ApiError::internal)?,
            });
        }
        Ok(sessions)
    }

    /// Removes the session and, through the cascade, its messages.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Session not found".to_string()));
        }
        Ok(())
    }

    pub async fn add_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
    ) -> Result<HistoryMessage, ApiError> {
        let message = HistoryMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ApiError::internal)?
            .is_some();
        if !exists {
            return Err(ApiError::NotFound("Session not found".to_string()));
        }

        sqlx::query(
            "INSERT INTO messages (id, session_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(&message.role)
        .bind(&message.content)
        .bind(&message.created_at)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(message)
    }

    /// Messages of one session in creation order.
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<HistoryMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM messages \
             WHERE session_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(HistoryMessage {
                id: row.try_get("id").map_err(ApiError::internal)?,
                session_id: row.try_get("session_id").map_err(ApiError::internal)?,
                role: row.try_get("role").map_err(ApiError::internal)?,
                content: row.try_get("content").map_err(ApiError::internal)?,
                created_at: row.try_get("created_at").map_err(ApiError::internal)?,
            });
        }
        Ok(messages)
    }
}
