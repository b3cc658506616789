//! History command handlers: list and delete stored conversations

use prettytable::{row, Table};

use crate::commands::AppContext;
use crate::config::Config;
use crate::error::Result;

/// List all stored conversations in a table
pub async fn list(config: &Config) -> Result<()> {
    let ctx = AppContext::build(config).await?;
    let entries = ctx.history.list().await?;

    if entries.is_empty() {
        println!("No stored conversations.");
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["ID", "PREVIEW", "TURNS"]);
    for entry in &entries {
        table.add_row(row![entry.history_id, entry.preview(), entry.pairs.len()]);
    }
    table.printstd();
    Ok(())
}

/// Delete one stored conversation
pub async fn delete(config: &Config, history_id: i64) -> Result<()> {
    let ctx = AppContext::build(config).await?;
    ctx.history.delete(history_id).await?;
    println!("Deleted conversation {}.", history_id);
    Ok(())
}
