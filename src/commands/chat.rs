//! Interactive chat session handler
//!
//! Runs a readline loop over the shared application context: plain input
//! goes to the conversation engine, slash commands drive the session,
//! history, and account operations. Failures are printed and the loop
//! continues; nothing in here is fatal to the process.

use colored::Colorize;
use prettytable::{row, Table};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::commands::{prompt_line, AppContext};
use crate::config::Config;
use crate::conversation::{Author, Message};
use crate::error::{ConfabError, Result};

/// A parsed `/command` line
#[derive(Debug, Clone, PartialEq, Eq)]
enum SlashCommand {
    Help,
    Quit,
    Login { email: String },
    Register { username: String, email: String },
    Logout,
    Profile,
    New,
    History,
    Open { history_id: i64 },
    Delete { history_id: i64 },
    DeleteAccount,
    Unknown(String),
}

/// Parse a slash command (the input without its leading `/`)
fn parse_slash_command(input: &str) -> SlashCommand {
    let mut parts = input.split_whitespace();
    let name = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match (name, args.as_slice()) {
        ("help", _) => SlashCommand::Help,
        ("quit", _) | ("exit", _) => SlashCommand::Quit,
        ("login", [email]) => SlashCommand::Login {
            email: email.to_string(),
        },
        ("register", [username, email]) => SlashCommand::Register {
            username: username.to_string(),
            email: email.to_string(),
        },
        ("logout", _) => SlashCommand::Logout,
        ("profile", _) => SlashCommand::Profile,
        ("new", _) => SlashCommand::New,
        ("history", _) => SlashCommand::History,
        ("open", [id]) => match id.parse() {
            Ok(history_id) => SlashCommand::Open { history_id },
            Err(_) => SlashCommand::Unknown(input.to_string()),
        },
        ("delete", [id]) => match id.parse() {
            Ok(history_id) => SlashCommand::Delete { history_id },
            Err(_) => SlashCommand::Unknown(input.to_string()),
        },
        ("delete-account", _) => SlashCommand::DeleteAccount,
        _ => SlashCommand::Unknown(input.to_string()),
    }
}

/// Send a single message to the active conversation and print the reply
pub async fn send_once(config: &Config, message: &str) -> Result<()> {
    let ctx = AppContext::build(config).await?;
    let reply = ctx.engine.send(message).await?;
    println!("{}", reply.text);
    Ok(())
}

/// Start the interactive chat session
pub async fn run_chat(config: Config) -> Result<()> {
    let ctx = AppContext::build(&config).await?;
    print_welcome(&ctx);

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline(&prompt(&ctx)) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                editor.add_history_entry(trimmed)?;

                if let Some(command) = trimmed.strip_prefix('/') {
                    if handle_slash_command(&ctx, parse_slash_command(command)).await {
                        break;
                    }
                    continue;
                }

                match ctx.engine.send(trimmed).await {
                    Ok(reply) => print_assistant(&reply),
                    Err(e) => print_error(&e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// Handle one slash command; returns `true` when the loop should exit
async fn handle_slash_command(ctx: &AppContext, command: SlashCommand) -> bool {
    match command {
        SlashCommand::Quit => return true,
        SlashCommand::Help => print_help(),
        SlashCommand::Login { email } => {
            let result = async {
                let password = prompt_line("Password: ")?;
                ctx.manager.login(&email, &password).await
            }
            .await;
            match result {
                Ok(user) => println!("{}", format!("Logged in as {}", user.username).green()),
                Err(e) => print_error(&e),
            }
        }
        SlashCommand::Register { username, email } => {
            let result = async {
                let password = prompt_line("Password: ")?;
                ctx.manager.register(&username, &email, &password).await
            }
            .await;
            match result {
                Ok(()) => println!(
                    "{}",
                    format!("Account '{}' registered; /login {} to continue", username, email)
                        .green()
                ),
                Err(e) => print_error(&e),
            }
        }
        SlashCommand::Logout => match ctx.manager.logout().await {
            Ok(()) => println!("Logged out."),
            Err(e) => print_error(&e),
        },
        SlashCommand::Profile => match ctx.manager.fetch_profile().await {
            Ok(user) => {
                println!("Username: {}", user.username);
                println!("Email:    {}", user.email);
                println!("User id:  {}", user.id);
            }
            Err(e) => print_error(&e),
        },
        SlashCommand::New => match ctx.engine.start_new_chat().await {
            Ok(()) => println!("Started a new conversation."),
            Err(e) => print_error(&e),
        },
        SlashCommand::History => match ctx.history.list().await {
            Ok(entries) if entries.is_empty() => println!("No stored conversations."),
            Ok(entries) => {
                let mut table = Table::new();
                table.add_row(row!["ID", "PREVIEW", "TURNS"]);
                for entry in &entries {
                    table.add_row(row![entry.history_id, entry.preview(), entry.pairs.len()]);
                }
                table.printstd();
                println!("Use /open <id> to continue one of these conversations.");
            }
            Err(e) => print_error(&e),
        },
        SlashCommand::Open { history_id } => match ctx.engine.load_existing(history_id).await {
            Ok(count) => {
                println!("Loaded conversation {} ({} messages):\n", history_id, count);
                for message in ctx.engine.messages() {
                    match message.author {
                        Author::User => println!("{} {}", "you>".cyan(), message.text),
                        Author::Assistant => print_assistant(&message),
                    }
                }
            }
            Err(e) => print_error(&e),
        },
        SlashCommand::Delete { history_id } => match ctx.history.delete(history_id).await {
            Ok(()) => println!("Deleted conversation {}.", history_id),
            Err(e) => print_error(&e),
        },
        SlashCommand::DeleteAccount => {
            let result = async {
                let confirmation = prompt_line("Type 'delete' to confirm: ")?;
                if confirmation != "delete" {
                    return Err(
                        ConfabError::Validation("Account deletion aborted".to_string()).into()
                    );
                }
                ctx.manager.delete_account().await
            }
            .await;
            match result {
                Ok(()) => println!("Account deleted."),
                Err(e) => print_error(&e),
            }
        }
        SlashCommand::Unknown(input) => {
            println!("Unknown command: /{}  (try /help)", input);
        }
    }
    false
}

fn prompt(ctx: &AppContext) -> String {
    match ctx.session.user() {
        Some(user) => format!("{}> ", user.username),
        None => "you> ".to_string(),
    }
}

fn print_assistant(message: &Message) {
    println!("{} {}\n", "assistant>".green(), message.text);
}

fn print_error(error: &anyhow::Error) {
    match error.downcast_ref::<ConfabError>() {
        Some(ConfabError::Busy(operation)) => {
            println!(
                "{}",
                format!("Hold on, a {} is still in flight.", operation).yellow()
            );
        }
        Some(ConfabError::Unauthorized) => {
            println!(
                "{}",
                "Your session expired; use /login <email> to continue.".yellow()
            );
        }
        Some(ConfabError::AuthRequired) => {
            println!("{}", "Not logged in; use /login <email> first.".yellow());
        }
        Some(ConfabError::Validation(message)) => {
            println!("{}", message.yellow());
        }
        _ => {
            eprintln!("{}", format!("Error: {}", error).red());
        }
    }
}

fn print_welcome(ctx: &AppContext) {
    println!("\nConfab — chat from your terminal\n");
    match ctx.session.user() {
        Some(user) => println!("Welcome back, {}.", user.username),
        None => println!("Not logged in; use /login <email> to start."),
    }
    if let Some(history_id) = ctx.engine.history_id() {
        println!("Continuing conversation {}.", history_id);
    }
    println!("Type '/help' for available commands, '/quit' to leave.\n");
}

fn print_help() {
    println!("Commands:");
    println!("  /login <email>               Log in (prompts for password)");
    println!("  /register <username> <email> Create an account");
    println!("  /logout                      Log out and clear credentials");
    println!("  /profile                     Show the current user");
    println!("  /new                         Start a new conversation");
    println!("  /history                     List stored conversations");
    println!("  /open <id>                   Continue a stored conversation");
    println!("  /delete <id>                 Delete a stored conversation");
    println!("  /delete-account              Permanently delete the account");
    println!("  /quit                        Exit");
    println!("Anything else is sent as a message.\n");
}
