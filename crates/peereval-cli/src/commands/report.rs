//! The `peereval report` command.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use comfy_table::{Cell, Table};

use peereval_core::report::build_report;
use peereval_providers::create_summarizer;
use peereval_report::{write_report, ReportFormat};

use super::Context;

pub async fn execute(ctx: &Context, round_id: i64, output: Option<PathBuf>, format: &str) -> Result<()> {
    let format: ReportFormat = format.parse().map_err(|e: String| anyhow!(e))?;
    let options = ctx.config.report.options()?;
    let input = ctx.db.report_input(round_id)?;
    let summarizer = create_summarizer(&ctx.config)?;

    println!(
        "Building report for round {} '{}' from {} responses ({} summaries)...",
        input.round.id,
        input.round.name,
        input.rows.len(),
        summarizer.name()
    );
    let report = build_report(&input, summarizer.as_ref(), &options).await;

    let path = output.unwrap_or_else(|| PathBuf::from(report.file_name()).with_extension(format.extension()));
    write_report(&report, format, &path)?;

    if report.scores.is_empty() {
        println!("No evaluations have been submitted for this round yet.");
    } else {
        let curved = report.curve_stats.is_some();
        let mut table = Table::new();
        let mut header = vec!["Evaluatee", "Team", "Score %", "Evaluations"];
        if curved {
            header.extend(["Curved %", "Grade"]);
        }
        table.set_header(header);
        for s in &report.scores {
            let mut row = vec![
                Cell::new(&s.evaluatee),
                Cell::new(&s.team),
                Cell::new(format!("{:.2}", s.avg_score_pct)),
                Cell::new(s.n_evals),
            ];
            if curved {
                row.push(Cell::new(
                    s.curved_score_pct.map(|p| format!("{p:.2}")).unwrap_or_default(),
                ));
                row.push(Cell::new(s.letter_grade.as_deref().unwrap_or("")));
            }
            table.add_row(row);
        }
        println!("{table}");

        for summary in report.summaries.iter().filter(|s| !s.red_flags.is_empty()) {
            println!(
                "Red flags for {} ({}): {}",
                summary.evaluatee,
                summary.team,
                summary.red_flags.join(", ")
            );
        }
    }

    println!("Report written to {}", path.display());
    Ok(())
}
