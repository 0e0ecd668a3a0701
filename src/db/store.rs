use async_trait::async_trait;

use crate::db::connection::DbPool;
use crate::db::error::StoreError;
use crate::db::models::{Chat, Message};
use crate::db::service::DbService;

/// Keyed persistence for chats and their messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StoreError>;

    async fn save_chat(&self, chat: &Chat) -> Result<(), StoreError>;

    /// Removes the chat and every message that belongs to it.
    async fn delete_chat(&self, id: &str) -> Result<(), StoreError>;

    async fn save_messages(&self, messages: &[Message]) -> Result<(), StoreError>;

    /// Whether a message row with this id is already stored.
    async fn has_message(&self, id: &str) -> Result<bool, StoreError>;

    async fn get_messages(&self, chat_id: &str) -> Result<Vec<Message>, StoreError>;

    async fn list_chats(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Chat>, StoreError>;
}

/// `ChatStore` backed by the shared DuckDB connection.
#[derive(Clone)]
pub struct DuckDbChatStore {
    pool: DbPool,
}

const MAX_HISTORY: usize = 10_000;

impl DuckDbChatStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&duckdb::Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.pool.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }
}

#[async_trait]
impl ChatStore for DuckDbChatStore {
    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StoreError> {
        self.with_conn(|conn| DbService::get_chat(conn, id))
    }

    async fn save_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        self.with_conn(|conn| DbService::insert_chat(conn, chat))
    }

    async fn delete_chat(&self, id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| DbService::delete_chat(conn, id))
    }

    async fn save_messages(&self, messages: &[Message]) -> Result<(), StoreError> {
        self.with_conn(|conn| DbService::insert_messages(conn, messages))
    }

    async fn has_message(&self, id: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| DbService::message_exists(conn, id))
    }

    async fn get_messages(&self, chat_id: &str) -> Result<Vec<Message>, StoreError> {
        self.with_conn(|conn| DbService::get_messages(conn, chat_id, MAX_HISTORY, 0))
    }

    async fn list_chats(
        &self,
        owner_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Chat>, StoreError> {
        self.with_conn(|conn| DbService::list_chats(conn, owner_id, limit, offset))
    }
}
