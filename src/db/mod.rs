pub mod connection;
pub mod error;
pub mod models;
pub mod service;
pub mod store;

pub use connection::{get_connection, DbPool};
pub use error::StoreError;
pub use models::*;
pub use store::{ChatStore, DuckDbChatStore};
