use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatwire", version, about = "Streaming LLM chat server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve,

    /// Inspect or remove stored chats
    Chats {
        #[command(subcommand)]
        action: ChatAction,
    },
}

#[derive(Subcommand)]
pub enum ChatAction {
    /// List the chats owned by a user, newest first
    List {
        #[arg(short, long)]
        owner: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Print a chat's messages
    Show { id: String },

    /// Delete a chat and its messages
    Delete { id: String },
}
