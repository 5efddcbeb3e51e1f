//! Loading a round's responses for reporting.

use chrono::{DateTime, Utc};
use rusqlite::params;

use peereval_core::model::{Response, ScoreEntry};
use peereval_core::report::{FeedbackRow, ReportInput};

use super::rosters::{rubric_items, student_at};
use super::rounds::get_round;
use super::{Database, StoreError};

impl Database {
    /// Every submitted response of a round with evaluator and evaluatee,
    /// ordered by team, evaluatee, then evaluator.
    pub fn report_input(&self, round_id: i64) -> Result<ReportInput, StoreError> {
        self.with_connection(|conn| {
            let round = get_round(conn, round_id)?.ok_or_else(|| StoreError::not_found("round", round_id))?;
            let items = rubric_items(conn, round.rubric_id)?;

            let mut stmt = conn.prepare(
                "SELECT r.id, r.token_id, r.submitted_at, r.scores, r.comments,
                        ev.id, ev.first_name, ev.last_name, ev.email, ev.team,
                        ee.id, ee.first_name, ee.last_name, ee.email, ee.team
                 FROM responses r
                 JOIN tokens t ON t.id = r.token_id
                 JOIN students ev ON ev.id = t.evaluator_id
                 JOIN students ee ON ee.id = t.evaluatee_id
                 WHERE t.round_id = ?1
                 ORDER BY ee.team, ee.last_name, ee.first_name, ev.last_name, ev.first_name",
            )?;
            let raw = stmt
                .query_map(params![round_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, DateTime<Utc>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        student_at(row, 5)?,
                        student_at(row, 10)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut rows = Vec::with_capacity(raw.len());
            for (id, token_id, submitted_at, scores, comments, evaluator, evaluatee) in raw {
                let scores: Vec<ScoreEntry> = serde_json::from_str(&scores)?;
                rows.push(FeedbackRow {
                    evaluator,
                    evaluatee,
                    response: Response {
                        id,
                        token_id,
                        submitted_at,
                        scores,
                        comments,
                    },
                });
            }

            Ok(ReportInput {
                round,
                rubric_items: items,
                rows,
            })
        })
    }
}
