//! Mock summarizer and mailer for testing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use peereval_core::traits::{Mailer, OutgoingMessage, Summarizer};

/// A summarizer that answers with a fixed text, or always fails.
pub struct MockSummarizer {
    response: Option<String>,
    call_count: AtomicU32,
    last_comments: Mutex<Option<Vec<String>>>,
}

impl MockSummarizer {
    /// Create a mock that always returns the same summary.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            call_count: AtomicU32::new(0),
            last_comments: Mutex::new(None),
        }
    }

    /// Create a mock whose every call fails.
    pub fn failing() -> Self {
        Self {
            response: None,
            call_count: AtomicU32::new(0),
            last_comments: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Comments passed to the most recent call.
    pub fn last_comments(&self) -> Option<Vec<String>> {
        self.last_comments.lock().ok().and_then(|c| c.clone())
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn summarize(&self, comments: &[String]) -> anyhow::Result<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_comments.lock() {
            *last = Some(comments.to_vec());
        }
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => anyhow::bail!("mock summarizer failure"),
        }
    }
}

/// A mailer that records messages in memory and can reject chosen
/// recipients.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<OutgoingMessage>>,
    reject: HashSet<String>,
    reject_all: bool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            reject_all: true,
            ..Self::default()
        }
    }

    /// A mailer that fails only for the given recipients.
    pub fn rejecting<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reject: recipients.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        if self.reject_all || self.reject.contains(&message.to) {
            anyhow::bail!("mock delivery to {} refused", message.to);
        }
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mock mailer lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peereval_core::notify::{dispatch, EvaluatorNotice};
    use peereval_core::model::Student;

    fn notice(email: &str, token_ids: Vec<i64>) -> EvaluatorNotice {
        EvaluatorNotice {
            evaluator: Student {
                id: 1,
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: email.into(),
                team: "Team A".into(),
            },
            message: OutgoingMessage {
                to: email.into(),
                subject: "Peer Evaluations - R".into(),
                body: "Hello".into(),
                round_id: Some(1),
            },
            token_ids,
        }
    }

    #[tokio::test]
    async fn fixed_summary() {
        let summarizer = MockSummarizer::with_fixed_response("- Great teammate");
        let out = summarizer.summarize(&["Great teammate.".into()]).await.unwrap();
        assert_eq!(out, "- Great teammate");
        assert_eq!(summarizer.call_count(), 1);
        assert_eq!(summarizer.last_comments().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_summarizer_errors() {
        let summarizer = MockSummarizer::failing();
        assert!(summarizer.summarize(&[]).await.is_err());
        assert_eq!(summarizer.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_degrades_to_fallback() {
        let primary = MockMailer::rejecting(["b@example.edu"]);
        let fallback = MockMailer::new();
        let notices = vec![
            notice("a@example.edu", vec![1, 2]),
            notice("b@example.edu", vec![3, 4]),
        ];

        let report = dispatch(&notices, &primary, Some(&fallback as &dyn Mailer)).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.fallback, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.sent_token_ids, vec![1, 2, 3, 4]);
        assert_eq!(primary.sent().len(), 1);
        assert_eq!(fallback.sent()[0].to, "b@example.edu");
    }

    #[tokio::test]
    async fn both_channels_failing_counts_failure() {
        let primary = MockMailer::failing();
        let fallback = MockMailer::failing();
        let report = dispatch(
            &[notice("a@example.edu", vec![1])],
            &primary,
            Some(&fallback as &dyn Mailer),
        )
        .await;
        assert_eq!(report.failed, 1);
        assert!(report.sent_token_ids.is_empty());
        assert_eq!(report.errors.len(), 1);
    }
}
