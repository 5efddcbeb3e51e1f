//! Evaluation email rendering and dispatch.
//!
//! Assignments are grouped by evaluator so each student gets one message
//! listing a link per teammate. Delivery goes through a primary [`Mailer`];
//! when it fails the message is handed to the fallback instead, so a broken
//! mail server never fails round creation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Assignment, Student};
use crate::traits::{Mailer, OutgoingMessage};

/// Link an evaluator follows to submit one evaluation.
pub fn evaluation_link(base_url: &str, token: &str) -> String {
    format!("{}/evaluate/{}", base_url.trim_end_matches('/'), token)
}

/// One evaluator's message and the token ids it covers.
#[derive(Debug, Clone)]
pub struct EvaluatorNotice {
    pub evaluator: Student,
    pub message: OutgoingMessage,
    pub token_ids: Vec<i64>,
}

/// Build one message per evaluator, ordered by evaluator email.
pub fn render_notices(
    round_id: i64,
    round_name: &str,
    base_url: &str,
    assignments: &[Assignment],
) -> Vec<EvaluatorNotice> {
    let mut by_evaluator: BTreeMap<&str, Vec<&Assignment>> = BTreeMap::new();
    for a in assignments {
        by_evaluator
            .entry(a.evaluator.email.as_str())
            .or_default()
            .push(a);
    }

    by_evaluator
        .into_values()
        .map(|group| {
            let evaluator = group[0].evaluator.clone();
            let links: Vec<String> = group
                .iter()
                .map(|a| {
                    format!(
                        "- Evaluate {}: {}",
                        a.evaluatee.full_name(),
                        evaluation_link(base_url, &a.token.token)
                    )
                })
                .collect();

            let body = format!(
                "Hello {},\n\n\
                 You have peer evaluations to complete for round '{}'. \
                 Please complete a form for each teammate:\n\n\
                 {}\n\n\
                 Each link is unique to you and your teammate. Please do not share.\n\n\
                 Thank you.\n",
                evaluator.first_name,
                round_name,
                links.join("\n")
            );

            EvaluatorNotice {
                message: OutgoingMessage {
                    to: evaluator.email.clone(),
                    subject: format!("Peer Evaluations - {round_name}"),
                    body,
                    round_id: Some(round_id),
                },
                token_ids: group.iter().map(|a| a.token.id).collect(),
                evaluator,
            }
        })
        .collect()
}

/// Outcome of dispatching a round's notices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Messages accepted by the primary channel.
    pub delivered: usize,
    /// Messages recorded by the fallback after the primary failed.
    pub fallback: usize,
    /// Messages neither channel accepted.
    pub failed: usize,
    /// Token ids whose message reached either channel.
    pub sent_token_ids: Vec<i64>,
    /// Recipient and error text for every primary failure.
    pub errors: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.delivered + self.fallback + self.failed
    }
}

/// Send every notice through `primary`, degrading to `fallback` on error.
///
/// Never returns an error: failures are counted and logged.
pub async fn dispatch(
    notices: &[EvaluatorNotice],
    primary: &dyn Mailer,
    fallback: Option<&dyn Mailer>,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for notice in notices {
        let to = &notice.message.to;
        match primary.send(&notice.message).await {
            Ok(()) => {
                tracing::info!(to = %to, channel = primary.name(), "evaluation notice sent");
                report.delivered += 1;
                report.sent_token_ids.extend(&notice.token_ids);
            }
            Err(e) => {
                tracing::warn!(to = %to, channel = primary.name(), "delivery failed: {e:#}");
                report.errors.push((to.clone(), format!("{e:#}")));

                let Some(fallback) = fallback else {
                    report.failed += 1;
                    continue;
                };
                match fallback.send(&notice.message).await {
                    Ok(()) => {
                        tracing::info!(to = %to, channel = fallback.name(), "evaluation notice recorded");
                        report.fallback += 1;
                        report.sent_token_ids.extend(&notice.token_ids);
                    }
                    Err(e) => {
                        tracing::error!(to = %to, channel = fallback.name(), "fallback failed: {e:#}");
                        report.failed += 1;
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvalToken;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn student(id: i64, first: &str, team: &str) -> Student {
        Student {
            id,
            first_name: first.into(),
            last_name: "Tester".into(),
            email: format!("{}@example.edu", first.to_lowercase()),
            team: team.into(),
        }
    }

    fn assignment(id: i64, evaluator: &Student, evaluatee: &Student) -> Assignment {
        Assignment {
            token: EvalToken {
                id,
                token: format!("tok{id}"),
                round_id: 1,
                evaluator_id: evaluator.id,
                evaluatee_id: evaluatee.id,
                sent_at: None,
                submitted_at: None,
            },
            evaluator: evaluator.clone(),
            evaluatee: evaluatee.clone(),
        }
    }

    fn team_of_three() -> Vec<Assignment> {
        let a = student(1, "Ada", "T");
        let b = student(2, "Bob", "T");
        let c = student(3, "Cy", "T");
        vec![
            assignment(1, &a, &b),
            assignment(2, &a, &c),
            assignment(3, &b, &a),
            assignment(4, &b, &c),
            assignment(5, &c, &a),
            assignment(6, &c, &b),
        ]
    }

    /// Records messages, failing for recipients listed in `reject`.
    struct RecordingMailer {
        name: &'static str,
        reject: Vec<String>,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    impl RecordingMailer {
        fn new(name: &'static str, reject: &[&str]) -> Self {
            Self {
                name,
                reject: reject.iter().map(|s| s.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
            if self.reject.contains(&message.to) {
                anyhow::bail!("connection refused");
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn link_strips_trailing_slash() {
        assert_eq!(
            evaluation_link("http://host:5000/", "abc"),
            "http://host:5000/evaluate/abc"
        );
    }

    #[test]
    fn one_notice_per_evaluator_with_links() {
        let notices = render_notices(7, "Sprint 1", "http://localhost:5000", &team_of_three());
        assert_eq!(notices.len(), 3);

        let ada = &notices[0];
        assert_eq!(ada.message.to, "ada@example.edu");
        assert_eq!(ada.message.subject, "Peer Evaluations - Sprint 1");
        assert_eq!(ada.message.round_id, Some(7));
        assert_eq!(ada.token_ids, vec![1, 2]);
        assert!(ada.message.body.starts_with("Hello Ada,"));
        assert!(ada
            .message
            .body
            .contains("- Evaluate Bob Tester: http://localhost:5000/evaluate/tok1"));
        assert!(ada
            .message
            .body
            .contains("- Evaluate Cy Tester: http://localhost:5000/evaluate/tok2"));
        assert!(ada.message.body.contains("Please do not share"));
    }

    #[tokio::test]
    async fn failures_degrade_to_fallback() {
        let notices = render_notices(1, "R", "http://x", &team_of_three());
        let smtp = RecordingMailer::new("smtp", &["bob@example.edu"]);
        let outbox = RecordingMailer::new("outbox", &[]);

        let report = dispatch(&notices, &smtp, Some(&outbox)).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.fallback, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.total(), 3);
        assert_eq!(report.sent_token_ids.len(), 6);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(outbox.sent.lock().unwrap()[0].to, "bob@example.edu");
    }

    #[tokio::test]
    async fn failure_without_fallback_is_counted() {
        let notices = render_notices(1, "R", "http://x", &team_of_three());
        let smtp = RecordingMailer::new("smtp", &["cy@example.edu"]);

        let report = dispatch(&notices, &smtp, None).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.sent_token_ids.contains(&5));
        assert!(!report.sent_token_ids.contains(&6));
    }
}
