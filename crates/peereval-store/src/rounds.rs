//! Evaluation rounds and their tokens.

use chrono::{Local, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use peereval_core::model::{Assignment, EvalToken, Round, RoundStatus, RoundSummary};

use super::rosters::{get_rubric, student_at, students_by_team};
use super::{Database, StoreError};

const ROUND_COLUMNS: &str = "r.id, r.name, r.rubric_id, r.status, r.created_at";

const ASSIGNMENT_QUERY: &str = "
    SELECT t.id, t.token, t.round_id, t.evaluator_id, t.evaluatee_id, t.sent_at, t.submitted_at,
           ev.id, ev.first_name, ev.last_name, ev.email, ev.team,
           ee.id, ee.first_name, ee.last_name, ee.email, ee.team
    FROM tokens t
    JOIN students ev ON ev.id = t.evaluator_id
    JOIN students ee ON ee.id = t.evaluatee_id";

pub(crate) fn round_from_row(row: &Row<'_>) -> rusqlite::Result<Round> {
    let status: String = row.get(3)?;
    let status = status
        .parse::<RoundStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;
    Ok(Round {
        id: row.get(0)?,
        name: row.get(1)?,
        rubric_id: row.get(2)?,
        status,
        created_at: row.get(4)?,
    })
}

pub(crate) fn token_from_row(row: &Row<'_>) -> rusqlite::Result<EvalToken> {
    Ok(EvalToken {
        id: row.get(0)?,
        token: row.get(1)?,
        round_id: row.get(2)?,
        evaluator_id: row.get(3)?,
        evaluatee_id: row.get(4)?,
        sent_at: row.get(5)?,
        submitted_at: row.get(6)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        token: token_from_row(row)?,
        evaluator: student_at(row, 7)?,
        evaluatee: student_at(row, 12)?,
    })
}

/// A fresh, unguessable token value.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Name used when a round is started without one.
pub fn default_round_name() -> String {
    Local::now().format("Round %Y-%m-%d %H:%M").to_string()
}

/// Create a round plus one token per ordered pair of distinct teammates.
/// Returns the round and the number of tokens created.
pub fn insert_round(
    conn: &Connection,
    name: Option<&str>,
    rubric_id: i64,
) -> Result<(Round, u32), StoreError> {
    let rubric = get_rubric(conn, rubric_id)?.ok_or_else(|| StoreError::not_found("rubric", rubric_id))?;
    if rubric.items.is_empty() {
        return Err(StoreError::EmptyRubric(rubric_id));
    }

    let teams = students_by_team(conn)?;
    if teams.values().all(|members| members.len() < 2) {
        return Err(StoreError::NoEvaluationPairs);
    }

    let name = match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => default_round_name(),
    };
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO rounds (name, rubric_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, rubric_id, RoundStatus::Open.to_string(), created_at],
    )?;
    let round = Round {
        id: conn.last_insert_rowid(),
        name,
        rubric_id,
        status: RoundStatus::Open,
        created_at,
    };

    let mut stmt = conn.prepare(
        "INSERT INTO tokens (token, round_id, evaluator_id, evaluatee_id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut created = 0u32;
    for (team, members) in &teams {
        if members.len() < 2 {
            tracing::warn!(team = %team, "team has a single member; no evaluations created");
            continue;
        }
        for evaluator in members {
            for evaluatee in members.iter().filter(|m| m.id != evaluator.id) {
                stmt.execute(params![new_token(), round.id, evaluator.id, evaluatee.id])?;
                created += 1;
            }
        }
    }
    Ok((round, created))
}

pub fn get_round(conn: &Connection, round_id: i64) -> Result<Option<Round>, StoreError> {
    let sql = format!("SELECT {ROUND_COLUMNS} FROM rounds r WHERE r.id = ?1");
    Ok(conn.query_row(&sql, params![round_id], round_from_row).optional()?)
}

/// All rounds with progress counts, newest first.
pub fn list_rounds(conn: &Connection) -> Result<Vec<RoundSummary>, StoreError> {
    let sql = format!(
        "SELECT {ROUND_COLUMNS}, b.name,
                (SELECT COUNT(*) FROM tokens t WHERE t.round_id = r.id),
                (SELECT COUNT(*) FROM tokens t WHERE t.round_id = r.id AND t.submitted_at IS NOT NULL)
         FROM rounds r JOIN rubrics b ON b.id = r.rubric_id
         ORDER BY r.created_at DESC, r.id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rounds = stmt
        .query_map([], |row| {
            Ok(RoundSummary {
                round: round_from_row(row)?,
                rubric_name: row.get(5)?,
                token_count: row.get(6)?,
                submitted_count: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rounds)
}

/// Tokens of a round joined with both students, ordered by evaluator.
pub fn assignments(
    conn: &Connection,
    round_id: i64,
    pending_only: bool,
) -> Result<Vec<Assignment>, StoreError> {
    let pending = if pending_only {
        " AND t.submitted_at IS NULL"
    } else {
        ""
    };
    let sql = format!(
        "{ASSIGNMENT_QUERY} WHERE t.round_id = ?1{pending} ORDER BY ev.team, ev.email, ee.email"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![round_id], assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    /// Start a round for the given rubric, creating every teammate token
    /// atomically.
    pub fn start_round(&self, name: Option<&str>, rubric_id: i64) -> Result<(Round, u32), StoreError> {
        let (round, tokens) = self.with_transaction(|tx| insert_round(tx, name, rubric_id))?;
        tracing::info!(round = round.id, name = %round.name, tokens, "round started");
        Ok((round, tokens))
    }

    pub fn get_round(&self, round_id: i64) -> Result<Round, StoreError> {
        self.with_connection(|conn| get_round(conn, round_id))?
            .ok_or_else(|| StoreError::not_found("round", round_id))
    }

    pub fn list_rounds(&self) -> Result<Vec<RoundSummary>, StoreError> {
        self.with_connection(list_rounds)
    }

    /// Close a round. Closing an already closed round is a no-op.
    pub fn close_round(&self, round_id: i64) -> Result<Round, StoreError> {
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE rounds SET status = ?1 WHERE id = ?2",
                params![RoundStatus::Closed.to_string(), round_id],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("round", round_id));
            }
            get_round(conn, round_id)?.ok_or_else(|| StoreError::not_found("round", round_id))
        })
        .inspect(|round| tracing::info!(round = round.id, "round closed"))
    }

    /// Delete a round along with its tokens, responses, and outbox entries.
    pub fn delete_round(&self, round_id: i64) -> Result<(), StoreError> {
        let deleted = self.with_connection(|conn| {
            Ok(conn.execute("DELETE FROM rounds WHERE id = ?1", params![round_id])?)
        })?;
        if deleted == 0 {
            return Err(StoreError::not_found("round", round_id));
        }
        tracing::info!(round = round_id, "round deleted");
        Ok(())
    }

    pub fn assignments(&self, round_id: i64, pending_only: bool) -> Result<Vec<Assignment>, StoreError> {
        self.with_connection(|conn| {
            if get_round(conn, round_id)?.is_none() {
                return Err(StoreError::not_found("round", round_id));
            }
            assignments(conn, round_id, pending_only)
        })
    }

    /// Stamp `sent_at` on the given tokens.
    pub fn mark_sent(&self, token_ids: &[i64]) -> Result<(), StoreError> {
        if token_ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.with_transaction(|tx| {
            let mut stmt = tx.prepare("UPDATE tokens SET sent_at = ?1 WHERE id = ?2")?;
            for id in token_ids {
                stmt.execute(params![now, id])?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{roster, seeded};
    use peereval_core::model::NewStudent;

    fn count(db: &Database, table: &str) -> i64 {
        db.with_connection(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn start_round_creates_teammate_pairs() {
        let (db, rubric_id) = seeded();
        let (round, tokens) = db.start_round(Some("Sprint 1"), rubric_id).unwrap();
        // two teams of three: 3 * 2 each
        assert_eq!(tokens, 12);
        assert!(round.is_open());
        assert_eq!(round.name, "Sprint 1");

        let pairs = db.assignments(round.id, false).unwrap();
        assert_eq!(pairs.len(), 12);
        for a in &pairs {
            assert_ne!(a.evaluator.id, a.evaluatee.id);
            assert_eq!(a.evaluator.team, a.evaluatee.team);
            assert_eq!(a.token.token.len(), 32);
            assert!(a.token.sent_at.is_none());
        }
    }

    #[test]
    fn default_name_used_when_blank() {
        let (db, rubric_id) = seeded();
        let (round, _) = db.start_round(Some("  "), rubric_id).unwrap();
        assert!(round.name.starts_with("Round "));
    }

    #[test]
    fn single_member_teams_are_skipped() {
        let (db, rubric_id) = seeded();
        db.import_students(&[NewStudent {
            first_name: "Solo".into(),
            last_name: "Student".into(),
            email: "solo@example.edu".into(),
            team: "Team Z".into(),
        }])
        .unwrap();
        let (_, tokens) = db.start_round(None, rubric_id).unwrap();
        assert_eq!(tokens, 12);
    }

    #[test]
    fn start_round_requires_pairs_and_criteria() {
        let db = Database::open_in_memory().unwrap();
        let rubric = db
            .create_rubric("R", &crate::test_support::rubric_items())
            .unwrap();
        assert!(matches!(
            db.start_round(None, rubric.id),
            Err(StoreError::NoEvaluationPairs)
        ));

        db.import_students(&roster()).unwrap();
        let empty = db.create_rubric("Empty", &[]).unwrap();
        assert!(matches!(
            db.start_round(None, empty.id),
            Err(StoreError::EmptyRubric(_))
        ));
        assert!(matches!(
            db.start_round(None, 404),
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(count(&db, "rounds"), 0);
    }

    #[test]
    fn list_rounds_newest_first_with_counts() {
        let (db, rubric_id) = seeded();
        let (first, _) = db.start_round(Some("First"), rubric_id).unwrap();
        let (second, _) = db.start_round(Some("Second"), rubric_id).unwrap();

        let rounds = db.list_rounds().unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].round.id, second.id);
        assert_eq!(rounds[1].round.id, first.id);
        assert_eq!(rounds[0].rubric_name, "Sample");
        assert_eq!(rounds[0].token_count, 12);
        assert_eq!(rounds[0].submitted_count, 0);
    }

    #[test]
    fn close_is_idempotent() {
        let (db, rubric_id) = seeded();
        let (round, _) = db.start_round(None, rubric_id).unwrap();
        assert_eq!(db.close_round(round.id).unwrap().status, RoundStatus::Closed);
        assert_eq!(db.close_round(round.id).unwrap().status, RoundStatus::Closed);
        assert!(db.close_round(round.id + 100).is_err());
    }

    #[test]
    fn mark_sent_and_pending_filter() {
        let (db, rubric_id) = seeded();
        let (round, _) = db.start_round(None, rubric_id).unwrap();
        let pairs = db.assignments(round.id, true).unwrap();
        let ids: Vec<i64> = pairs.iter().take(3).map(|a| a.token.id).collect();
        db.mark_sent(&ids).unwrap();

        let sent = db
            .assignments(round.id, false)
            .unwrap()
            .into_iter()
            .filter(|a| a.token.sent_at.is_some())
            .count();
        assert_eq!(sent, 3);
    }

    #[test]
    fn delete_round_cascades() {
        let (db, rubric_id) = seeded();
        let (round, _) = db.start_round(None, rubric_id).unwrap();
        let token = db.assignments(round.id, false).unwrap()[0].token.token.clone();
        db.submit(&token, &Default::default()).unwrap();
        db.record_outbox(Some(round.id), "a@example.edu", "s", "b").unwrap();

        db.delete_round(round.id).unwrap();
        assert_eq!(count(&db, "rounds"), 0);
        assert_eq!(count(&db, "tokens"), 0);
        assert_eq!(count(&db, "responses"), 0);
        assert_eq!(count(&db, "outbox"), 0);
        assert!(matches!(
            db.delete_round(round.id),
            Err(StoreError::NotFound { .. })
        ));
    }
}
