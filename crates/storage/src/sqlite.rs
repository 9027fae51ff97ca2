//! SQLite store.
//!
//! Schema notes:
//! - `documents` is versioned: the primary key is (id, created_at), and the
//!   newest row for an id is the current version.
//! - `votes` is keyed by (chat_id, message_id); re-voting upserts.
//! - `tools` and `agents` enforce UNIQUE(user_id, name), surfaced as
//!   `StorageError::NameConflict`.
//! - Deleting a chat cascades to its messages and votes.

use avacyn_core::chat::{Chat, Vote};
use avacyn_core::document::{
    AgentDefinition, Document, DocumentKind, Execution, ExecutionStatus, StoredTool, Suggestion,
};
use avacyn_core::error::StorageError;
use avacyn_core::message::{Message, MessageToolCall, Role};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A production SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// A paged listing plus the total row count for the filter.
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl SqliteStore {
    /// Create a new store from a file path.
    ///
    /// The database and all tables are created automatically. Pass
    /// `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StorageError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                title      TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id           TEXT PRIMARY KEY,
                chat_id      TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                tool_calls   TEXT NOT NULL DEFAULT '[]',
                tool_call_id TEXT,
                created_at   TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                chat_id    TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                message_id TEXT NOT NULL,
                is_upvoted INTEGER NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id         TEXT NOT NULL,
                created_at TEXT NOT NULL,
                title      TEXT NOT NULL,
                kind       TEXT NOT NULL DEFAULT 'text',
                content    TEXT NOT NULL DEFAULT '',
                user_id    TEXT NOT NULL,
                PRIMARY KEY (id, created_at)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS suggestions (
                id                  TEXT PRIMARY KEY,
                document_id         TEXT NOT NULL,
                document_created_at TEXT NOT NULL,
                original_text       TEXT NOT NULL,
                suggested_text      TEXT NOT NULL,
                description         TEXT NOT NULL DEFAULT '',
                is_resolved         INTEGER NOT NULL DEFAULT 0,
                user_id             TEXT NOT NULL,
                created_at          TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tools (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                description TEXT,
                parameters  TEXT NOT NULL DEFAULT '{}',
                user_id     TEXT NOT NULL,
                UNIQUE (user_id, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id       TEXT PRIMARY KEY,
                name     TEXT NOT NULL,
                prompt   TEXT,
                tool_ids TEXT NOT NULL DEFAULT '[]',
                user_id  TEXT NOT NULL,
                UNIQUE (user_id, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id           TEXT PRIMARY KEY,
                agent_id     TEXT NOT NULL,
                input        TEXT NOT NULL,
                status       TEXT NOT NULL,
                output       TEXT,
                created_at   TEXT NOT NULL,
                completed_at TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id, created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_suggestions_doc ON suggestions(document_id)",
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn get_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<String, StorageError> {
        row.try_get(column)
            .map_err(|e| StorageError::QueryFailed(format!("{column} column: {e}")))
    }

    fn is_unique_violation(e: &sqlx::Error) -> bool {
        e.as_database_error()
            .is_some_and(|db| db.kind() == sqlx::error::ErrorKind::UniqueViolation)
    }

    // --- Row mappers ---

    fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> Result<Chat, StorageError> {
        Ok(Chat {
            id: Self::get_text(row, "id")?,
            user_id: Self::get_text(row, "user_id")?,
            title: Self::get_text(row, "title")?,
            created_at: Self::parse_timestamp(&Self::get_text(row, "created_at")?),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StorageError> {
        let role_str = Self::get_text(row, "role")?;
        let role = Role::from_str(&role_str).map_err(StorageError::QueryFailed)?;
        let tool_calls_json = Self::get_text(row, "tool_calls")?;
        let tool_calls: Vec<MessageToolCall> =
            serde_json::from_str(&tool_calls_json).unwrap_or_default();
        let tool_call_id: Option<String> = row
            .try_get("tool_call_id")
            .map_err(|e| StorageError::QueryFailed(format!("tool_call_id column: {e}")))?;

        Ok(Message {
            id: Self::get_text(row, "id")?,
            role,
            content: Self::get_text(row, "content")?,
            tool_calls,
            tool_call_id,
            created_at: Self::parse_timestamp(&Self::get_text(row, "created_at")?),
        })
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, StorageError> {
        let kind_str = Self::get_text(row, "kind")?;
        let kind = DocumentKind::from_str(&kind_str).map_err(StorageError::QueryFailed)?;
        Ok(Document {
            id: Self::get_text(row, "id")?,
            created_at: Self::parse_timestamp(&Self::get_text(row, "created_at")?),
            title: Self::get_text(row, "title")?,
            kind,
            content: Self::get_text(row, "content")?,
            user_id: Self::get_text(row, "user_id")?,
        })
    }

    fn row_to_suggestion(row: &sqlx::sqlite::SqliteRow) -> Result<Suggestion, StorageError> {
        let is_resolved: i64 = row
            .try_get("is_resolved")
            .map_err(|e| StorageError::QueryFailed(format!("is_resolved column: {e}")))?;
        Ok(Suggestion {
            id: Self::get_text(row, "id")?,
            document_id: Self::get_text(row, "document_id")?,
            document_created_at: Self::parse_timestamp(&Self::get_text(
                row,
                "document_created_at",
            )?),
            original_text: Self::get_text(row, "original_text")?,
            suggested_text: Self::get_text(row, "suggested_text")?,
            description: Self::get_text(row, "description")?,
            is_resolved: is_resolved != 0,
            user_id: Self::get_text(row, "user_id")?,
            created_at: Self::parse_timestamp(&Self::get_text(row, "created_at")?),
        })
    }

    fn row_to_tool(row: &sqlx::sqlite::SqliteRow) -> Result<StoredTool, StorageError> {
        let parameters_json = Self::get_text(row, "parameters")?;
        let parameters =
            serde_json::from_str(&parameters_json).unwrap_or(serde_json::Value::Null);
        let description: Option<String> = row
            .try_get("description")
            .map_err(|e| StorageError::QueryFailed(format!("description column: {e}")))?;
        Ok(StoredTool {
            id: Self::get_text(row, "id")?,
            name: Self::get_text(row, "name")?,
            description,
            parameters,
            user_id: Self::get_text(row, "user_id")?,
        })
    }

    fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<AgentDefinition, StorageError> {
        let tool_ids_json = Self::get_text(row, "tool_ids")?;
        let tool_ids: Vec<String> = serde_json::from_str(&tool_ids_json).unwrap_or_default();
        let prompt: Option<String> = row
            .try_get("prompt")
            .map_err(|e| StorageError::QueryFailed(format!("prompt column: {e}")))?;
        Ok(AgentDefinition {
            id: Self::get_text(row, "id")?,
            name: Self::get_text(row, "name")?,
            prompt,
            tool_ids,
            user_id: Self::get_text(row, "user_id")?,
        })
    }

    fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<Execution, StorageError> {
        let status_str = Self::get_text(row, "status")?;
        let status = ExecutionStatus::from_str(&status_str).map_err(StorageError::QueryFailed)?;
        let output: Option<String> = row
            .try_get("output")
            .map_err(|e| StorageError::QueryFailed(format!("output column: {e}")))?;
        let completed_at: Option<String> = row
            .try_get("completed_at")
            .map_err(|e| StorageError::QueryFailed(format!("completed_at column: {e}")))?;
        Ok(Execution {
            id: Self::get_text(row, "id")?,
            agent_id: Self::get_text(row, "agent_id")?,
            input: Self::get_text(row, "input")?,
            status,
            output,
            created_at: Self::parse_timestamp(&Self::get_text(row, "created_at")?),
            completed_at: completed_at.as_deref().map(Self::parse_timestamp),
        })
    }

    // --- Chats ---

    pub async fn save_chat(&self, chat: &Chat) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO chats (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title",
        )
        .bind(&chat.id)
        .bind(&chat.user_id)
        .bind(&chat.title)
        .bind(chat.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("INSERT chat failed: {e}")))?;
        debug!(chat_id = %chat.id, "Saved chat");
        Ok(())
    }

    pub async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StorageError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("SELECT chat: {e}")))?;
        row.as_ref().map(Self::row_to_chat).transpose()
    }

    pub async fn list_chats_by_user(&self, user_id: &str) -> Result<Vec<Chat>, StorageError> {
        let rows =
            sqlx::query("SELECT * FROM chats WHERE user_id = ?1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("SELECT chats: {e}")))?;
        rows.iter().map(Self::row_to_chat).collect()
    }

    /// Delete a chat with its messages and votes.
    pub async fn delete_chat(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("DELETE chat failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    // --- Messages ---

    pub async fn save_messages(
        &self,
        chat_id: &str,
        messages: &[Message],
    ) -> Result<(), StorageError> {
        for message in messages {
            let tool_calls_json = serde_json::to_string(&message.tool_calls)
                .map_err(|e| StorageError::Storage(format!("tool_calls serialization: {e}")))?;
            sqlx::query(
                "INSERT INTO messages (id, chat_id, role, content, tool_calls, tool_call_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&message.id)
            .bind(chat_id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(&tool_calls_json)
            .bind(&message.tool_call_id)
            .bind(message.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("INSERT message failed: {e}")))?;
        }
        Ok(())
    }

    /// All messages of a chat, in conversational order.
    pub async fn get_messages_by_chat(&self, chat_id: &str) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE chat_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("SELECT messages: {e}")))?;
        rows.iter().map(Self::row_to_message).collect()
    }

    // --- Votes ---

    pub async fn vote_message(
        &self,
        chat_id: &str,
        message_id: &str,
        is_upvoted: bool,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO votes (chat_id, message_id, is_upvoted) VALUES (?1, ?2, ?3)
             ON CONFLICT(chat_id, message_id) DO UPDATE SET is_upvoted = excluded.is_upvoted",
        )
        .bind(chat_id)
        .bind(message_id)
        .bind(is_upvoted as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("INSERT vote failed: {e}")))?;
        Ok(())
    }

    pub async fn get_votes_by_chat(&self, chat_id: &str) -> Result<Vec<Vote>, StorageError> {
        let rows = sqlx::query("SELECT * FROM votes WHERE chat_id = ?1")
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("SELECT votes: {e}")))?;
        rows.iter()
            .map(|row| {
                let is_upvoted: i64 = row
                    .try_get("is_upvoted")
                    .map_err(|e| StorageError::QueryFailed(format!("is_upvoted column: {e}")))?;
                Ok(Vote {
                    chat_id: Self::get_text(row, "chat_id")?,
                    message_id: Self::get_text(row, "message_id")?,
                    is_upvoted: is_upvoted != 0,
                })
            })
            .collect()
    }

    // --- Documents ---

    /// Append one document version. Same id + later timestamp = newer version.
    pub async fn save_document(&self, document: &Document) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO documents (id, created_at, title, kind, content, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id, created_at) DO UPDATE SET
                title = excluded.title,
                kind = excluded.kind,
                content = excluded.content",
        )
        .bind(&document.id)
        .bind(document.created_at.to_rfc3339())
        .bind(&document.title)
        .bind(document.kind.as_str())
        .bind(&document.content)
        .bind(&document.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("INSERT document failed: {e}")))?;
        debug!(document_id = %document.id, kind = document.kind.as_str(), "Saved document version");
        Ok(())
    }

    /// The latest version of a document.
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE id = ?1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("SELECT document: {e}")))?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    /// All versions of a document, oldest first.
    pub async fn get_document_versions(&self, id: &str) -> Result<Vec<Document>, StorageError> {
        let rows =
            sqlx::query("SELECT * FROM documents WHERE id = ?1 ORDER BY created_at ASC")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("SELECT documents: {e}")))?;
        rows.iter().map(Self::row_to_document).collect()
    }

    /// Roll back a document: delete every version strictly after `timestamp`,
    /// along with suggestions bound to those versions.
    pub async fn delete_document_versions_after(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let ts = timestamp.to_rfc3339();

        sqlx::query("DELETE FROM suggestions WHERE document_id = ?1 AND document_created_at > ?2")
            .bind(id)
            .bind(&ts)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("DELETE suggestions failed: {e}")))?;

        let result = sqlx::query("DELETE FROM documents WHERE id = ?1 AND created_at > ?2")
            .bind(id)
            .bind(&ts)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("DELETE documents failed: {e}")))?;
        Ok(result.rows_affected())
    }

    // --- Suggestions ---

    pub async fn save_suggestions(&self, suggestions: &[Suggestion]) -> Result<(), StorageError> {
        for s in suggestions {
            sqlx::query(
                "INSERT INTO suggestions
                 (id, document_id, document_created_at, original_text, suggested_text,
                  description, is_resolved, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(&s.id)
            .bind(&s.document_id)
            .bind(s.document_created_at.to_rfc3339())
            .bind(&s.original_text)
            .bind(&s.suggested_text)
            .bind(&s.description)
            .bind(s.is_resolved as i64)
            .bind(&s.user_id)
            .bind(s.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("INSERT suggestion failed: {e}")))?;
        }
        Ok(())
    }

    pub async fn get_suggestions_by_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<Suggestion>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM suggestions WHERE document_id = ?1 ORDER BY created_at ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("SELECT suggestions: {e}")))?;
        rows.iter().map(Self::row_to_suggestion).collect()
    }

    // --- Tools ---

    pub async fn create_tool(&self, tool: &StoredTool) -> Result<(), StorageError> {
        let parameters_json = serde_json::to_string(&tool.parameters)
            .map_err(|e| StorageError::Storage(format!("parameters serialization: {e}")))?;
        sqlx::query(
            "INSERT INTO tools (id, name, description, parameters, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&tool.id)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(&parameters_json)
        .bind(&tool.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                StorageError::NameConflict(tool.name.clone())
            } else {
                StorageError::Storage(format!("INSERT tool failed: {e}"))
            }
        })?;
        Ok(())
    }

    pub async fn get_tool(&self, id: &str) -> Result<Option<StoredTool>, StorageError> {
        let row = sqlx::query("SELECT * FROM tools WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("SELECT tool: {e}")))?;
        row.as_ref().map(Self::row_to_tool).transpose()
    }

    pub async fn get_tools_by_ids(&self, ids: &[String]) -> Result<Vec<StoredTool>, StorageError> {
        let mut tools = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tool) = self.get_tool(id).await? {
                tools.push(tool);
            }
        }
        Ok(tools)
    }

    /// Paged tool listing for one user, optionally filtered by a substring
    /// match on the name.
    pub async fn list_tools(
        &self,
        user_id: &str,
        page: i64,
        page_size: i64,
        search: Option<&str>,
    ) -> Result<Page<StoredTool>, StorageError> {
        let pattern = search.map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));
        let offset = (page.max(1) - 1) * page_size;

        let (rows, total) = match &pattern {
            Some(p) => {
                let rows = sqlx::query(
                    "SELECT * FROM tools WHERE user_id = ?1 AND name LIKE ?2 ESCAPE '\\'
                     ORDER BY name ASC LIMIT ?3 OFFSET ?4",
                )
                .bind(user_id)
                .bind(p)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("SELECT tools: {e}")))?;
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM tools WHERE user_id = ?1 AND name LIKE ?2 ESCAPE '\\'",
                )
                .bind(user_id)
                .bind(p)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("COUNT tools: {e}")))?;
                (rows, total)
            }
            None => {
                let rows = sqlx::query(
                    "SELECT * FROM tools WHERE user_id = ?1 ORDER BY name ASC LIMIT ?2 OFFSET ?3",
                )
                .bind(user_id)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("SELECT tools: {e}")))?;
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM tools WHERE user_id = ?1")
                        .bind(user_id)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(|e| StorageError::QueryFailed(format!("COUNT tools: {e}")))?;
                (rows, total)
            }
        };

        Ok(Page {
            items: rows
                .iter()
                .map(Self::row_to_tool)
                .collect::<Result<_, _>>()?,
            total,
        })
    }

    pub async fn update_tool(&self, tool: &StoredTool) -> Result<(), StorageError> {
        let parameters_json = serde_json::to_string(&tool.parameters)
            .map_err(|e| StorageError::Storage(format!("parameters serialization: {e}")))?;
        let result = sqlx::query(
            "UPDATE tools SET name = ?2, description = ?3, parameters = ?4 WHERE id = ?1",
        )
        .bind(&tool.id)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(&parameters_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                StorageError::NameConflict(tool.name.clone())
            } else {
                StorageError::Storage(format!("UPDATE tool failed: {e}"))
            }
        })?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("tool {}", tool.id)));
        }
        Ok(())
    }

    pub async fn delete_tool(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM tools WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("DELETE tool failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    // --- Agents ---

    pub async fn create_agent(&self, agent: &AgentDefinition) -> Result<(), StorageError> {
        let tool_ids_json = serde_json::to_string(&agent.tool_ids)
            .map_err(|e| StorageError::Storage(format!("tool_ids serialization: {e}")))?;
        sqlx::query(
            "INSERT INTO agents (id, name, prompt, tool_ids, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.prompt)
        .bind(&tool_ids_json)
        .bind(&agent.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                StorageError::NameConflict(agent.name.clone())
            } else {
                StorageError::Storage(format!("INSERT agent failed: {e}"))
            }
        })?;
        Ok(())
    }

    pub async fn get_agent(&self, id: &str) -> Result<Option<AgentDefinition>, StorageError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("SELECT agent: {e}")))?;
        row.as_ref().map(Self::row_to_agent).transpose()
    }

    pub async fn list_agents(
        &self,
        user_id: &str,
        page: i64,
        page_size: i64,
        search: Option<&str>,
    ) -> Result<Page<AgentDefinition>, StorageError> {
        let pattern = search.map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));
        let offset = (page.max(1) - 1) * page_size;

        let (rows, total) = match &pattern {
            Some(p) => {
                let rows = sqlx::query(
                    "SELECT * FROM agents WHERE user_id = ?1 AND name LIKE ?2 ESCAPE '\\'
                     ORDER BY name ASC LIMIT ?3 OFFSET ?4",
                )
                .bind(user_id)
                .bind(p)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("SELECT agents: {e}")))?;
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM agents WHERE user_id = ?1 AND name LIKE ?2 ESCAPE '\\'",
                )
                .bind(user_id)
                .bind(p)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("COUNT agents: {e}")))?;
                (rows, total)
            }
            None => {
                let rows = sqlx::query(
                    "SELECT * FROM agents WHERE user_id = ?1 ORDER BY name ASC LIMIT ?2 OFFSET ?3",
                )
                .bind(user_id)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::QueryFailed(format!("SELECT agents: {e}")))?;
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM agents WHERE user_id = ?1")
                        .bind(user_id)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(|e| StorageError::QueryFailed(format!("COUNT agents: {e}")))?;
                (rows, total)
            }
        };

        Ok(Page {
            items: rows
                .iter()
                .map(Self::row_to_agent)
                .collect::<Result<_, _>>()?,
            total,
        })
    }

    pub async fn update_agent(&self, agent: &AgentDefinition) -> Result<(), StorageError> {
        let tool_ids_json = serde_json::to_string(&agent.tool_ids)
            .map_err(|e| StorageError::Storage(format!("tool_ids serialization: {e}")))?;
        let result = sqlx::query(
            "UPDATE agents SET name = ?2, prompt = ?3, tool_ids = ?4 WHERE id = ?1",
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.prompt)
        .bind(&tool_ids_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                StorageError::NameConflict(agent.name.clone())
            } else {
                StorageError::Storage(format!("UPDATE agent failed: {e}"))
            }
        })?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("agent {}", agent.id)));
        }
        Ok(())
    }

    pub async fn delete_agent(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(format!("DELETE agent failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    // --- Executions ---

    pub async fn create_execution(&self, execution: &Execution) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO executions (id, agent_id, input, status, output, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&execution.id)
        .bind(&execution.agent_id)
        .bind(&execution.input)
        .bind(execution.status.as_str())
        .bind(&execution.output)
        .bind(execution.created_at.to_rfc3339())
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("INSERT execution failed: {e}")))?;
        Ok(())
    }

    /// Record the terminal state of an execution.
    pub async fn complete_execution(
        &self,
        id: &str,
        status: ExecutionStatus,
        output: &str,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE executions SET status = ?2, output = ?3, completed_at = ?4 WHERE id = ?1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(output)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(format!("UPDATE execution failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("execution {id}")));
        }
        Ok(())
    }

    pub async fn get_execution(&self, id: &str) -> Result<Option<Execution>, StorageError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("SELECT execution: {e}")))?;
        row.as_ref().map(Self::row_to_execution).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn make_chat(user_id: &str) -> Chat {
        Chat {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: "Essai sur la mer".into(),
            created_at: Utc::now(),
        }
    }

    fn make_document(id: &str, content: &str, created_at: DateTime<Utc>) -> Document {
        Document {
            id: id.into(),
            created_at,
            title: "Essai".into(),
            kind: DocumentKind::Text,
            content: content.into(),
            user_id: "u1".into(),
        }
    }

    #[tokio::test]
    async fn chat_round_trip() {
        let store = test_store().await;
        let chat = make_chat("u1");
        store.save_chat(&chat).await.unwrap();

        let fetched = store.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Essai sur la mer");
        assert_eq!(fetched.user_id, "u1");
    }

    #[tokio::test]
    async fn missing_chat_is_none() {
        let store = test_store().await;
        assert!(store.get_chat("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_preserve_conversational_order() {
        let store = test_store().await;
        let chat = make_chat("u1");
        store.save_chat(&chat).await.unwrap();

        let mut messages = vec![
            Message::user("Bonjour"),
            Message::assistant("Bonjour ! Comment puis-je aider ?"),
            Message::user("Écris un haïku"),
        ];
        // Force identical timestamps; insertion order must still hold.
        let now = Utc::now();
        for m in &mut messages {
            m.created_at = now;
        }
        store.save_messages(&chat.id, &messages).await.unwrap();

        let fetched = store.get_messages_by_chat(&chat.id).await.unwrap();
        assert_eq!(fetched.len(), 3);
        assert_eq!(fetched[0].content, "Bonjour");
        assert_eq!(fetched[2].content, "Écris un haïku");
    }

    #[tokio::test]
    async fn message_tool_calls_round_trip() {
        let store = test_store().await;
        let chat = make_chat("u1");
        store.save_chat(&chat).await.unwrap();

        let mut msg = Message::assistant("");
        msg.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "getWeather".into(),
            arguments: r#"{"latitude":48.85,"longitude":2.35}"#.into(),
        }];
        store.save_messages(&chat.id, &[msg]).await.unwrap();

        let fetched = store.get_messages_by_chat(&chat.id).await.unwrap();
        assert_eq!(fetched[0].tool_calls.len(), 1);
        assert_eq!(fetched[0].tool_calls[0].name, "getWeather");
    }

    #[tokio::test]
    async fn delete_chat_cascades() {
        let store = test_store().await;
        let chat = make_chat("u1");
        store.save_chat(&chat).await.unwrap();
        store
            .save_messages(&chat.id, &[Message::user("salut")])
            .await
            .unwrap();
        store.vote_message(&chat.id, "m1", true).await.unwrap();

        assert!(store.delete_chat(&chat.id).await.unwrap());
        assert!(store.get_chat(&chat.id).await.unwrap().is_none());
        assert!(store.get_messages_by_chat(&chat.id).await.unwrap().is_empty());
        assert!(store.get_votes_by_chat(&chat.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn revote_upserts() {
        let store = test_store().await;
        let chat = make_chat("u1");
        store.save_chat(&chat).await.unwrap();

        store.vote_message(&chat.id, "m1", true).await.unwrap();
        store.vote_message(&chat.id, "m1", false).await.unwrap();

        let votes = store.get_votes_by_chat(&chat.id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert!(!votes[0].is_upvoted);
    }

    #[tokio::test]
    async fn document_latest_version_wins() {
        let store = test_store().await;
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);
        store.save_document(&make_document("d1", "v1", t0)).await.unwrap();
        store.save_document(&make_document("d1", "v2", t1)).await.unwrap();

        let latest = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(latest.content, "v2");

        let versions = store.get_document_versions("d1").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].content, "v1");
    }

    #[tokio::test]
    async fn rollback_deletes_strictly_after_timestamp() {
        let store = test_store().await;
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);
        let t2 = t0 + chrono::Duration::seconds(20);
        store.save_document(&make_document("d1", "v1", t0)).await.unwrap();
        store.save_document(&make_document("d1", "v2", t1)).await.unwrap();
        store.save_document(&make_document("d1", "v3", t2)).await.unwrap();

        let deleted = store.delete_document_versions_after("d1", t1).await.unwrap();
        assert_eq!(deleted, 1);

        let versions = store.get_document_versions("d1").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions.last().unwrap().content, "v2");
    }

    #[tokio::test]
    async fn rollback_removes_stale_suggestions() {
        let store = test_store().await;
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);
        store.save_document(&make_document("d1", "v1", t0)).await.unwrap();
        store.save_document(&make_document("d1", "v2", t1)).await.unwrap();

        let suggestion = Suggestion {
            id: "s1".into(),
            document_id: "d1".into(),
            document_created_at: t1,
            original_text: "avant".into(),
            suggested_text: "après".into(),
            description: String::new(),
            is_resolved: false,
            user_id: "u1".into(),
            created_at: Utc::now(),
        };
        store.save_suggestions(&[suggestion]).await.unwrap();

        store.delete_document_versions_after("d1", t0).await.unwrap();
        assert!(store
            .get_suggestions_by_document("d1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn suggestions_round_trip() {
        let store = test_store().await;
        let t0 = Utc::now();
        let suggestions: Vec<Suggestion> = (0..3)
            .map(|i| Suggestion {
                id: format!("s{i}"),
                document_id: "d1".into(),
                document_created_at: t0,
                original_text: format!("original {i}"),
                suggested_text: format!("amélioré {i}"),
                description: "clarifie".into(),
                is_resolved: false,
                user_id: "u1".into(),
                created_at: t0 + chrono::Duration::milliseconds(i),
            })
            .collect();
        store.save_suggestions(&suggestions).await.unwrap();

        let fetched = store.get_suggestions_by_document("d1").await.unwrap();
        assert_eq!(fetched.len(), 3);
        assert_eq!(fetched[0].suggested_text, "amélioré 0");
        assert_eq!(fetched[0].document_created_at.to_rfc3339(), t0.to_rfc3339());
    }

    #[tokio::test]
    async fn tool_name_conflict_per_user() {
        let store = test_store().await;
        let tool = StoredTool {
            id: "t1".into(),
            name: "webSearch".into(),
            description: None,
            parameters: serde_json::json!({"query": "sample"}),
            user_id: "u1".into(),
        };
        store.create_tool(&tool).await.unwrap();

        let duplicate = StoredTool {
            id: "t2".into(),
            ..tool.clone()
        };
        let err = store.create_tool(&duplicate).await.unwrap_err();
        assert!(matches!(err, StorageError::NameConflict(name) if name == "webSearch"));

        // Same name under a different user is fine
        let other_user = StoredTool {
            id: "t3".into(),
            user_id: "u2".into(),
            ..tool
        };
        store.create_tool(&other_user).await.unwrap();
    }

    #[tokio::test]
    async fn tool_listing_pages_and_filters() {
        let store = test_store().await;
        for i in 0..12 {
            store
                .create_tool(&StoredTool {
                    id: format!("t{i}"),
                    name: format!("tool{i:02}"),
                    description: None,
                    parameters: serde_json::json!({}),
                    user_id: "u1".into(),
                })
                .await
                .unwrap();
        }

        let page = store.list_tools("u1", 1, 5, None).await.unwrap();
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total, 12);
        assert_eq!(page.items[0].name, "tool00");

        let page2 = store.list_tools("u1", 3, 5, None).await.unwrap();
        assert_eq!(page2.items.len(), 2);

        let filtered = store.list_tools("u1", 1, 10, Some("tool01")).await.unwrap();
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.items[0].name, "tool01");
    }

    #[tokio::test]
    async fn update_missing_tool_is_not_found() {
        let store = test_store().await;
        let err = store
            .update_tool(&StoredTool {
                id: "ghost".into(),
                name: "x".into(),
                description: None,
                parameters: serde_json::json!({}),
                user_id: "u1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn agent_round_trip_with_tool_ids() {
        let store = test_store().await;
        let agent = AgentDefinition {
            id: "a1".into(),
            name: "veilleur".into(),
            prompt: Some("Tu surveilles l'actualité.".into()),
            tool_ids: vec!["t1".into(), "t2".into()],
            user_id: "u1".into(),
        };
        store.create_agent(&agent).await.unwrap();

        let fetched = store.get_agent("a1").await.unwrap().unwrap();
        assert_eq!(fetched.tool_ids, vec!["t1", "t2"]);
        assert_eq!(fetched.prompt.as_deref(), Some("Tu surveilles l'actualité."));
    }

    #[tokio::test]
    async fn agent_delete_and_list() {
        let store = test_store().await;
        for name in ["alpha", "beta"] {
            store
                .create_agent(&AgentDefinition {
                    id: name.into(),
                    name: name.into(),
                    prompt: None,
                    tool_ids: vec![],
                    user_id: "u1".into(),
                })
                .await
                .unwrap();
        }
        assert!(store.delete_agent("alpha").await.unwrap());
        assert!(!store.delete_agent("alpha").await.unwrap());

        let page = store.list_agents("u1", 1, 10, None).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "beta");
    }

    #[tokio::test]
    async fn execution_lifecycle() {
        let store = test_store().await;
        let execution = Execution {
            id: "e1".into(),
            agent_id: "a1".into(),
            input: "analyse ce texte".into(),
            status: ExecutionStatus::Started,
            output: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        store.create_execution(&execution).await.unwrap();

        store
            .complete_execution("e1", ExecutionStatus::Completed, "résultat final")
            .await
            .unwrap();

        let fetched = store.get_execution("e1").await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Completed);
        assert_eq!(fetched.output.as_deref(), Some("résultat final"));
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn chats_list_newest_first() {
        let store = test_store().await;
        let mut c1 = make_chat("u1");
        c1.created_at = Utc::now() - chrono::Duration::minutes(5);
        c1.title = "ancien".into();
        let mut c2 = make_chat("u1");
        c2.title = "récent".into();
        store.save_chat(&c1).await.unwrap();
        store.save_chat(&c2).await.unwrap();
        store.save_chat(&make_chat("u2")).await.unwrap();

        let chats = store.list_chats_by_user("u1").await.unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].title, "récent");
    }
}
