//! Command-line interface definition for Confab
//!
//! This module defines the CLI structure using clap's derive API,
//! providing the interactive chat mode plus one-shot account, send, and
//! history commands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Confab - chat service client
///
/// Talk to a conversational chat service from the terminal: manage the
/// authenticated session, send messages, and browse past conversations.
#[derive(Parser, Debug, Clone)]
#[command(name = "confab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Base URL of the chat service API
    #[arg(long, env = "CONFAB_API_URL")]
    pub api_url: Option<String>,

    /// Path to the credentials file
    #[arg(long, env = "CONFAB_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Confab
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Log in to the chat service (prompts for the password)
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },

    /// Create a new account (prompts for the password)
    Register {
        /// Desired username
        #[arg(short, long)]
        username: String,

        /// Account email address
        #[arg(short, long)]
        email: String,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show the authenticated user's profile
    Profile,

    /// Send a single message to the active conversation
    Send {
        /// Message text
        message: String,
    },

    /// Browse and manage past conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Permanently delete the account on the server
    DeleteAccount {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored conversations
    List,

    /// Delete a stored conversation
    Delete {
        /// Server-assigned conversation id
        history_id: i64,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            api_url: None,
            credentials_file: None,
            verbose: false,
            command: Commands::Chat,
        }
    }
}
