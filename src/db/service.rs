use crate::db::error::StoreError;
use crate::db::models::{Chat, Message, MessageContent, Role};
use chrono::{DateTime, Utc};
use duckdb::{params, types::Type, Connection, Result as DbResult, Row};
use tracing::warn;

const TIMESTAMP_IN: &str = "%Y-%m-%d %H:%M:%S%.6f";

const CHAT_COLUMNS: &str =
    "id, owner_id, title, strftime(created_at, '%Y-%m-%dT%H:%M:%S.%fZ')";

const MESSAGE_COLUMNS: &str =
    "id, chat_id, role, content, reasoning, strftime(created_at, '%Y-%m-%dT%H:%M:%S.%fZ')";

pub struct DbService;

impl DbService {
    fn parse_timestamp(row: &Row, idx: usize) -> DbResult<DateTime<Utc>> {
        let raw: String = row.get(idx)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn row_to_chat(row: &Row) -> DbResult<Chat> {
        Ok(Chat {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            created_at: Self::parse_timestamp(row, 3)?,
        })
    }

    fn row_to_message(row: &Row) -> DbResult<Message> {
        let role_str: String = row.get(2)?;
        let role = Role::parse(&role_str).ok_or_else(|| {
            duckdb::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown role '{}'", role_str).into(),
            )
        })?;

        let content_str: String = row.get(3)?;
        let content: MessageContent = serde_json::from_str(&content_str)
            .map_err(|e| duckdb::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(Message {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            role,
            content,
            reasoning: row.get(4)?,
            created_at: Self::parse_timestamp(row, 5)?,
        })
    }

    /// Runs `body` inside BEGIN/COMMIT, rolling back if it fails.
    fn in_transaction<T>(
        conn: &Connection,
        body: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        conn.execute_batch("BEGIN TRANSACTION")?;
        match body(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    warn!("Rollback failed after {}: {}", e, rollback);
                }
                Err(e)
            }
        }
    }

    // --- Chat Operations ---

    pub fn insert_chat(conn: &Connection, chat: &Chat) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO chats (id, owner_id, title, created_at) \
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                chat.id,
                chat.owner_id,
                chat.title,
                chat.created_at.format(TIMESTAMP_IN).to_string()
            ],
        )?;
        Ok(())
    }

    pub fn get_chat(conn: &Connection, id: &str) -> Result<Option<Chat>, StoreError> {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM chats WHERE id = ?", CHAT_COLUMNS))?;
        let mut rows = stmt.query_map(params![id], Self::row_to_chat)?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_chats(
        conn: &Connection,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Chat>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chats WHERE owner_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
            CHAT_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![owner_id, limit as i64, offset as i64],
            Self::row_to_chat,
        )?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Deletes the chat together with its messages.
    pub fn delete_chat(conn: &Connection, id: &str) -> Result<(), StoreError> {
        Self::in_transaction(conn, |conn| {
            conn.execute("DELETE FROM messages WHERE chat_id = ?", params![id])?;
            conn.execute("DELETE FROM chats WHERE id = ?", params![id])?;
            Ok(())
        })
    }

    // --- Message Operations ---

    pub fn insert_messages(conn: &Connection, messages: &[Message]) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }

        Self::in_transaction(conn, |conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO messages (id, chat_id, role, content, reasoning, created_at)
                 VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            )?;
            for message in messages {
                let content = serde_json::to_string(&message.content)?;
                stmt.execute(params![
                    message.id,
                    message.chat_id,
                    message.role.as_str(),
                    content,
                    message.reasoning,
                    message.created_at.format(TIMESTAMP_IN).to_string()
                ])?;
            }
            Ok(())
        })
    }

    pub fn message_exists(conn: &Connection, id: &str) -> Result<bool, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE id = ?",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_messages(
        conn: &Connection,
        chat_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE chat_id = ? \
             ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![chat_id, limit as i64, offset as i64],
            Self::row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}
