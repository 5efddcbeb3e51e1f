//! The `peereval serve` command.

use std::sync::Arc;

use anyhow::{Context as _, Result};

use peereval_providers::create_summarizer;

use super::Context;
use crate::server::{router, AppState};

pub async fn execute(ctx: Context, host: &str, port: u16) -> Result<()> {
    let summarizer = create_summarizer(&ctx.config)?;
    let state = AppState {
        db: ctx.db,
        config: Arc::new(ctx.config),
        summarizer: Arc::from(summarizer),
    };

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "serving evaluation endpoints");
    println!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
