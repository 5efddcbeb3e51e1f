//! The `peereval students` commands.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};

use peereval_core::parser;

use super::Context;

pub fn import(ctx: &Context, file: &Path) -> Result<()> {
    let roster = parser::parse_students(file)?;
    for line in &roster.skipped_lines {
        eprintln!("Warning: line {line} skipped (empty email)");
    }

    let summary = ctx.db.import_students(&roster.students)?;
    println!(
        "Imported {} students ({} added, {} updated).",
        summary.added + summary.updated,
        summary.added,
        summary.updated
    );
    Ok(())
}

pub fn list(ctx: &Context, team: Option<&str>) -> Result<()> {
    let students: Vec<_> = ctx
        .db
        .list_students()?
        .into_iter()
        .filter(|s| team.map_or(true, |t| s.team == t))
        .collect();

    if students.is_empty() {
        println!("No students. Import a roster with `peereval students import <file>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Email", "Team"]);
    for s in &students {
        table.add_row(vec![
            Cell::new(s.id),
            Cell::new(s.full_name()),
            Cell::new(&s.email),
            Cell::new(&s.team),
        ]);
    }
    println!("{table}");
    println!("{} student(s)", students.len());
    Ok(())
}
