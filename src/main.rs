//! Confab - chat service client CLI
//!
#![doc = "Confab - chat service client CLI"]
#![doc = "Main entry point for the Confab application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use confab::cli::{Cli, Commands, HistoryCommand};
use confab::commands;
use confab::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // If the user supplied a credentials path on the CLI (or via env),
    // mirror it into CONFAB_CREDENTIALS_FILE so the default store
    // initializer picks it up as well.
    if let Some(path) = &cli.credentials_file {
        std::env::set_var("CONFAB_CREDENTIALS_FILE", path);
        tracing::info!("Using credentials file override: {}", path.display());
    }

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(|| "config/config.yaml".to_string());
    let config = Config::load(&config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat => {
            tracing::info!("Starting interactive chat session");
            commands::chat::run_chat(config).await
        }
        Commands::Login { email } => commands::account::login(&config, &email).await,
        Commands::Register { username, email } => {
            commands::account::register(&config, &username, &email).await
        }
        Commands::Logout => commands::account::logout(&config).await,
        Commands::Profile => commands::account::profile(&config).await,
        Commands::Send { message } => commands::chat::send_once(&config, &message).await,
        Commands::History { command } => match command {
            HistoryCommand::List => commands::history::list(&config).await,
            HistoryCommand::Delete { history_id } => {
                commands::history::delete(&config, history_id).await
            }
        },
        Commands::DeleteAccount { yes } => commands::account::delete_account(&config, yes).await,
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "confab=debug" } else { "confab=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
