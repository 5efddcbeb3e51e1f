//! The `peereval rubric` commands.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};

use peereval_core::model::NewRubricItem;
use peereval_core::parser;

use super::Context;

pub fn import(ctx: &Context, file: &Path, name: &str) -> Result<()> {
    let items = parser::parse_rubric(file)?;
    for w in parser::validate_rubric(&items) {
        eprintln!("Warning: {}", w.message);
    }
    let rubric = ctx.db.create_rubric(name, &items)?;
    println!(
        "Created rubric {} '{}' with {} criteria.",
        rubric.id,
        rubric.name,
        rubric.items.len()
    );
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let rubrics = ctx.db.list_rubrics()?;
    if rubrics.is_empty() {
        println!("No rubrics. Import one with `peereval rubric import <file>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Criteria", "Total Weight", "Created"]);
    for r in &rubrics {
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(&r.name),
            Cell::new(r.items.len()),
            Cell::new(r.total_weight()),
            Cell::new(r.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn show(ctx: &Context, id: i64) -> Result<()> {
    let rubric = ctx.db.get_rubric(id)?;
    println!(
        "Rubric {}: {} ({})",
        rubric.id,
        rubric.name,
        if rubric.active { "active" } else { "inactive" }
    );

    let mut table = Table::new();
    table.set_header(vec!["Item", "Criterion", "Description", "Weight", "Max"]);
    for item in &rubric.items {
        table.add_row(vec![
            Cell::new(item.id),
            Cell::new(&item.criterion),
            Cell::new(item.description.as_deref().unwrap_or("")),
            Cell::new(item.weight),
            Cell::new(item.max_score),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn delete(ctx: &Context, id: i64) -> Result<()> {
    ctx.db.delete_rubric(id)?;
    println!("Deleted rubric {id}.");
    Ok(())
}

pub fn add_item(
    ctx: &Context,
    rubric_id: i64,
    criterion: String,
    description: Option<String>,
    weight: f64,
    max_score: i64,
) -> Result<()> {
    let item = ctx.db.add_rubric_item(
        rubric_id,
        &NewRubricItem {
            criterion,
            description,
            weight,
            max_score,
        },
    )?;
    println!(
        "Added item {} '{}' to rubric {rubric_id}.",
        item.id, item.criterion
    );
    Ok(())
}

pub fn delete_item(ctx: &Context, id: i64) -> Result<()> {
    ctx.db.delete_rubric_item(id)?;
    println!("Deleted rubric item {id}.");
    Ok(())
}
