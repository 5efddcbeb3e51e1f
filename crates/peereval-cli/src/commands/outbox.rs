//! The `peereval outbox` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use super::Context;

pub fn execute(ctx: &Context, limit: usize, full: bool) -> Result<()> {
    let messages = ctx.db.list_outbox(limit)?;
    if messages.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    if full {
        for m in &messages {
            println!("--- #{} {} ---", m.id, m.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("To: {}", m.to_addr);
            println!("Subject: {}\n", m.subject);
            println!("{}", m.body);
        }
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Created", "Round", "To", "Subject"]);
    for m in &messages {
        table.add_row(vec![
            Cell::new(m.id),
            Cell::new(m.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(m.round_id.map(|r| r.to_string()).unwrap_or_default()),
            Cell::new(&m.to_addr),
            Cell::new(&m.subject),
        ]);
    }
    println!("{table}");
    Ok(())
}
