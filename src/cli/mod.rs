pub mod commands;

use thiserror::Error;

use crate::cli::commands::{ChatAction, Commands};
use crate::config::AppConfig;
use crate::db::{get_connection, ChatStore, DuckDbChatStore, StoreError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load config: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("failed to open database: {0}")]
    Database(#[from] duckdb::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("chat {0} not found")]
    ChatNotFound(String),
    #[error("serve is handled by the server entry point")]
    Serve,
}

pub async fn run_cli(command: Commands, config_path: &str) -> Result<(), CliError> {
    let config = AppConfig::load(config_path)?;

    match command {
        Commands::Serve => Err(CliError::Serve),
        Commands::Chats { action } => {
            let store = DuckDbChatStore::new(get_connection(&config.database)?);
            run_chat_action(&store, action).await
        }
    }
}

pub async fn run_chat_action(store: &dyn ChatStore, action: ChatAction) -> Result<(), CliError> {
    match action {
        ChatAction::List { owner, limit } => {
            let chats = store.list_chats(&owner, limit, 0).await?;
            if chats.is_empty() {
                println!("No chats found.");
                return Ok(());
            }
            println!("{:<38} | {:<20} | Title", "ID", "Created At");
            println!("{:-<38}-+-{:-<20}-+-{:-<20}", "", "", "");
            for chat in chats {
                println!(
                    "{:<38} | {:<20} | {}",
                    chat.id,
                    chat.created_at.format("%Y-%m-%d %H:%M:%S"),
                    chat.title
                );
            }
        }
        ChatAction::Show { id } => {
            let chat = store
                .get_chat(&id)
                .await?
                .ok_or_else(|| CliError::ChatNotFound(id.clone()))?;
            println!("Chat: {} ({})", chat.title, chat.id);
            println!("Owner: {}", chat.owner_id);
            println!("---");
            for message in store.get_messages(&id).await? {
                if let Some(reasoning) = &message.reasoning {
                    println!("[{} reasoning]: {}", message.role.as_str().to_uppercase(), reasoning);
                }
                println!("[{}]: {}", message.role.as_str().to_uppercase(), message.content.text());
                println!("---");
            }
        }
        ChatAction::Delete { id } => {
            if store.get_chat(&id).await?.is_none() {
                return Err(CliError::ChatNotFound(id));
            }
            store.delete_chat(&id).await?;
            println!("Deleted chat {}", id);
        }
    }
    Ok(())
}
