//! peereval-providers — configuration and external delivery channels.
//!
//! Implements the `Summarizer` trait over an OpenAI-compatible chat API and
//! the `Mailer` trait over SMTP, and loads the `peereval.toml` settings that
//! select between them.

pub mod config;
pub mod error;
pub mod mock;
pub mod openai;
pub mod smtp;

pub use config::{
    create_mailer, create_summarizer, load_config, load_config_from, MailConfig, PeerEvalConfig,
    ReportConfig, SummarizerConfig,
};
pub use error::{MailError, SummarizerError};
