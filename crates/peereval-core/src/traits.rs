//! Core trait definitions for comment summarizers and mail delivery.
//!
//! Implemented by `peereval-providers` (external summarizer, SMTP) and
//! `peereval-store` (outbox). The local summarizer lives in [`crate::nlp`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Summarizer trait
// ---------------------------------------------------------------------------

/// Turns a student's collected peer comments into a short summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Human-readable summarizer name (e.g. "local", "openai").
    fn name(&self) -> &str;

    /// Summarize a set of comments about one student.
    async fn summarize(&self, comments: &[String]) -> anyhow::Result<String>;
}

/// System prompt sent to external summarizers.
pub const SUMMARY_SYSTEM_PROMPT: &str =
    "Summarize peer feedback succinctly in 3 bullet points.";

// ---------------------------------------------------------------------------
// Mailer trait
// ---------------------------------------------------------------------------

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Round the message belongs to, so outbox entries can be cleaned up
    /// with the round.
    #[serde(default)]
    pub round_id: Option<i64>,
}

/// A delivery channel for evaluation emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Channel name (e.g. "smtp", "outbox").
    fn name(&self) -> &str;

    /// Deliver one message.
    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()>;
}
