//! Token validation and response intake.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use peereval_core::error::InvalidToken;
use peereval_core::model::{EvalToken, EvaluationForm, Response, Round, ScoreEntry, Submission};

use super::rosters::{rubric_items, student_at};
use super::rounds::{get_round, token_from_row};
use super::{Database, StoreError};

fn find_token(conn: &Connection, token: &str) -> Result<Option<EvalToken>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, token, round_id, evaluator_id, evaluatee_id, sent_at, submitted_at
             FROM tokens WHERE token = ?1",
            params![token.trim()],
            token_from_row,
        )
        .optional()?)
}

/// Resolve a token that can still accept a submission.
///
/// Checks run in order: the token exists, its round is open, it has not
/// been consumed.
pub fn check_token(conn: &Connection, token: &str) -> Result<(EvalToken, Round), StoreError> {
    let token = find_token(conn, token)?.ok_or(InvalidToken::Unknown)?;
    let round = get_round(conn, token.round_id)?.ok_or(InvalidToken::Unknown)?;
    if !round.is_open() {
        return Err(InvalidToken::RoundClosed.into());
    }
    if token.is_consumed() {
        return Err(InvalidToken::AlreadySubmitted.into());
    }
    Ok((token, round))
}

fn student(conn: &Connection, id: i64) -> Result<peereval_core::model::Student, StoreError> {
    conn.query_row(
        "SELECT id, first_name, last_name, email, team FROM students WHERE id = ?1",
        params![id],
        |row| student_at(row, 0),
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("student", id))
}

/// Store a response for `token` and consume it.
pub fn insert_response(
    conn: &Connection,
    token: &str,
    submission: &Submission,
) -> Result<Response, StoreError> {
    let (token, round) = check_token(conn, token)?;
    let items = rubric_items(conn, round.rubric_id)?;

    for id in submission.scores.keys() {
        if !items.iter().any(|i| i.id == *id) {
            tracing::warn!(token = token.id, item = id, "ignoring score for unknown criterion");
        }
    }

    let scores: Vec<ScoreEntry> = items
        .iter()
        .map(|item| ScoreEntry {
            item_id: item.id,
            criterion: item.criterion.clone(),
            score: submission
                .scores
                .get(&item.id)
                .copied()
                .unwrap_or(0)
                .clamp(0, item.max_score),
            max_score: item.max_score,
            weight: item.weight,
        })
        .collect();

    let submitted_at = Utc::now();
    let comments = submission.comments.trim().to_string();
    let consumed = conn.execute(
        "UPDATE tokens SET submitted_at = ?1 WHERE id = ?2 AND submitted_at IS NULL",
        params![submitted_at, token.id],
    )?;
    if consumed == 0 {
        return Err(InvalidToken::AlreadySubmitted.into());
    }
    conn.execute(
        "INSERT INTO responses (token_id, submitted_at, scores, comments) VALUES (?1, ?2, ?3, ?4)",
        params![token.id, submitted_at, serde_json::to_string(&scores)?, comments],
    )?;

    Ok(Response {
        id: conn.last_insert_rowid(),
        token_id: token.id,
        submitted_at,
        scores,
        comments,
    })
}

impl Database {
    /// Validate a token without consuming it.
    pub fn check_token(&self, token: &str) -> Result<(EvalToken, Round), StoreError> {
        self.with_connection(|conn| check_token(conn, token))
    }

    /// What an evaluator needs to fill in the form behind `token`.
    pub fn evaluation_form(&self, token: &str) -> Result<EvaluationForm, StoreError> {
        self.with_connection(|conn| {
            let (token, round) = check_token(conn, token)?;
            Ok(EvaluationForm {
                round_name: round.name,
                evaluator: student(conn, token.evaluator_id)?.full_name(),
                evaluatee: student(conn, token.evaluatee_id)?.full_name(),
                items: rubric_items(conn, round.rubric_id)?,
            })
        })
    }

    /// Accept a submission for `token`. The response row and the token's
    /// consumption are written together.
    pub fn submit(&self, token: &str, submission: &Submission) -> Result<Response, StoreError> {
        let response = self.with_transaction(|tx| insert_response(tx, token, submission))?;
        tracing::info!(response = response.id, token = response.token_id, "evaluation submitted");
        Ok(response)
    }
}
