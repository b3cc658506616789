//! Account command handlers: login, registration, profile, logout, deletion

use colored::Colorize;

use crate::commands::{prompt_line, AppContext};
use crate::config::Config;
use crate::error::{ConfabError, Result};

/// Log in with the given email, prompting for the password
pub async fn login(config: &Config, email: &str) -> Result<()> {
    let ctx = AppContext::build(config).await?;
    let password = prompt_line("Password: ")?;

    let user = ctx.manager.login(email, &password).await?;
    println!(
        "{}",
        format!("Logged in as {} <{}>", user.username, user.email).green()
    );
    Ok(())
}

/// Register a new account, prompting for the password
pub async fn register(config: &Config, username: &str, email: &str) -> Result<()> {
    let ctx = AppContext::build(config).await?;
    let password = prompt_line("Password: ")?;

    ctx.manager.register(username, email, &password).await?;
    println!(
        "{}",
        format!("Account '{}' registered. Log in with: confab login --email {}", username, email)
            .green()
    );
    Ok(())
}

/// Log out and clear stored credentials
pub async fn logout(config: &Config) -> Result<()> {
    let ctx = AppContext::build(config).await?;
    ctx.manager.logout().await?;
    println!("Logged out.");
    Ok(())
}

/// Show the authenticated user's profile
pub async fn profile(config: &Config) -> Result<()> {
    let ctx = AppContext::build(config).await?;
    let user = ctx.manager.fetch_profile().await?;

    println!("Username: {}", user.username);
    println!("Email:    {}", user.email);
    println!("User id:  {}", user.id);
    Ok(())
}

/// Permanently delete the account on the server
///
/// Without `--yes` the user has to type the word `delete` to confirm; this
/// is not an operation to trigger by accident.
pub async fn delete_account(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        println!(
            "{}",
            "This permanently deletes your account and all conversations.".red()
        );
        let confirmation = prompt_line("Type 'delete' to confirm: ")?;
        if confirmation != "delete" {
            return Err(ConfabError::Validation("Account deletion aborted".to_string()).into());
        }
    }

    let ctx = AppContext::build(config).await?;
    ctx.manager.delete_account().await?;
    println!("Account deleted.");
    Ok(())
}
