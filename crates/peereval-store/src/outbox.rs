//! In-app outbox: messages recorded instead of being mailed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;

use peereval_core::model::OutboxMessage;
use peereval_core::traits::{Mailer, OutgoingMessage};

use super::{Database, StoreError};

impl Database {
    /// Record a message in the outbox.
    pub fn record_outbox(
        &self,
        round_id: Option<i64>,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<i64, StoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO outbox (created_at, round_id, to_addr, subject, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![Utc::now(), round_id, to, subject, body],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent outbox messages first.
    pub fn list_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, round_id, to_addr, subject, body
                 FROM outbox ORDER BY created_at DESC, id DESC LIMIT ?1",
            )?;
            let messages = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(OutboxMessage {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        round_id: row.get(2)?,
                        to_addr: row.get(3)?,
                        subject: row.get(4)?,
                        body: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
    }
}

/// A [`Mailer`] that writes every message to the outbox table.
pub struct OutboxMailer {
    db: Arc<Database>,
}

impl OutboxMailer {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    fn name(&self) -> &str {
        "outbox"
    }

    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        let id = self.db.record_outbox(
            message.round_id,
            &message.to,
            &message.subject,
            &message.body,
        )?;
        tracing::debug!(outbox = id, to = %message.to, "message recorded in outbox");
        Ok(())
    }
}
