//! The `peereval round` commands.

use anyhow::Result;
use comfy_table::{Cell, Table};

use peereval_core::model::Round;
use peereval_core::notify::{dispatch, evaluation_link, render_notices, DispatchReport};
use peereval_core::traits::Mailer;
use peereval_providers::create_mailer;
use peereval_store::OutboxMailer;

use super::Context;

/// Send evaluation links for a round and stamp the delivered tokens.
///
/// SMTP is used when configured, with the outbox as fallback; without SMTP
/// every message goes straight to the outbox.
pub async fn send_notices(ctx: &Context, round: &Round, pending_only: bool) -> Result<DispatchReport> {
    let assignments = ctx.db.assignments(round.id, pending_only)?;
    let notices = render_notices(round.id, &round.name, &ctx.config.base_url, &assignments);
    let outbox = OutboxMailer::new(ctx.db.clone());

    let smtp = match create_mailer(&ctx.config.mail) {
        Ok(mailer) => mailer,
        Err(e) => {
            tracing::warn!("mail configuration unusable, using the outbox: {e:#}");
            None
        }
    };

    let report = match &smtp {
        Some(mailer) => dispatch(&notices, mailer.as_ref(), Some(&outbox as &dyn Mailer)).await,
        None => dispatch(&notices, &outbox, None).await,
    };

    ctx.db.mark_sent(&report.sent_token_ids)?;
    Ok(report)
}

fn print_dispatch(report: &DispatchReport) {
    println!(
        "Messages: {} sent, {} recorded in the outbox after delivery failed, {} failed.",
        report.delivered, report.fallback, report.failed
    );
    for (to, error) in &report.errors {
        eprintln!("  delivery to {to} failed: {error}");
    }
}

pub async fn start(ctx: &Context, rubric_id: i64, name: Option<&str>, send: bool) -> Result<()> {
    let (round, tokens) = ctx.db.start_round(name, rubric_id)?;
    println!(
        "Round {} '{}' started. Generated {tokens} evaluation links.",
        round.id, round.name
    );

    if send {
        let report = send_notices(ctx, &round, false).await?;
        print_dispatch(&report);
    }
    Ok(())
}

pub fn close(ctx: &Context, id: i64) -> Result<()> {
    let round = ctx.db.close_round(id)?;
    println!("Round {} '{}' closed.", round.id, round.name);
    Ok(())
}

pub fn delete(ctx: &Context, id: i64) -> Result<()> {
    ctx.db.delete_round(id)?;
    println!("Deleted round {id} and all its links, responses, and messages.");
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let rounds = ctx.db.list_rounds()?;
    if rounds.is_empty() {
        println!("No rounds yet. Start one with `peereval round start --rubric <id>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Rubric", "Status", "Submitted", "Created"]);
    for r in &rounds {
        table.add_row(vec![
            Cell::new(r.round.id),
            Cell::new(&r.round.name),
            Cell::new(&r.rubric_name),
            Cell::new(r.round.status),
            Cell::new(format!("{}/{}", r.submitted_count, r.token_count)),
            Cell::new(r.round.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn links(ctx: &Context, id: i64, pending: bool) -> Result<()> {
    let round = ctx.db.get_round(id)?;
    let assignments = ctx.db.assignments(round.id, pending)?;

    let mut table = Table::new();
    table.set_header(vec!["Evaluator", "Evaluatee", "Team", "Status", "Link"]);
    for a in &assignments {
        let status = if a.token.is_consumed() {
            "submitted"
        } else if a.token.sent_at.is_some() {
            "sent"
        } else {
            "pending"
        };
        table.add_row(vec![
            Cell::new(a.evaluator.full_name()),
            Cell::new(a.evaluatee.full_name()),
            Cell::new(&a.evaluator.team),
            Cell::new(status),
            Cell::new(evaluation_link(&ctx.config.base_url, &a.token.token)),
        ]);
    }
    println!("Round {} '{}' ({})", round.id, round.name, round.status);
    println!("{table}");
    Ok(())
}

pub async fn remind(ctx: &Context, id: i64) -> Result<()> {
    let round = ctx.db.get_round(id)?;
    anyhow::ensure!(round.is_open(), "round {} is closed", round.id);

    let report = send_notices(ctx, &round, true).await?;
    if report.total() == 0 {
        println!("Every evaluation of round {} has been submitted.", round.id);
    } else {
        print_dispatch(&report);
    }
    Ok(())
}
