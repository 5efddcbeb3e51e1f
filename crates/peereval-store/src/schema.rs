//! Database schema definitions

use rusqlite::Connection;

use super::StoreError;

/// SQL schema for all tables
const SCHEMA: &str = r#"
-- Roster
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    team TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_students_team ON students(team);

-- Rubrics and their criteria
CREATE TABLE IF NOT EXISTS rubrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rubric_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rubric_id INTEGER NOT NULL REFERENCES rubrics(id) ON DELETE CASCADE,
    criterion TEXT NOT NULL,
    description TEXT,
    weight REAL NOT NULL DEFAULT 1.0,
    max_score INTEGER NOT NULL DEFAULT 5
);

CREATE INDEX IF NOT EXISTS idx_rubric_items_rubric ON rubric_items(rubric_id);

-- Evaluation rounds
CREATE TABLE IF NOT EXISTS rounds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    rubric_id INTEGER NOT NULL REFERENCES rubrics(id) ON DELETE RESTRICT,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL
);

-- Single-use evaluation links
CREATE TABLE IF NOT EXISTS tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    token TEXT NOT NULL UNIQUE,
    round_id INTEGER NOT NULL REFERENCES rounds(id) ON DELETE CASCADE,
    evaluator_id INTEGER NOT NULL REFERENCES students(id),
    evaluatee_id INTEGER NOT NULL REFERENCES students(id),
    sent_at TEXT,
    submitted_at TEXT,
    UNIQUE(round_id, evaluator_id, evaluatee_id)
);

CREATE INDEX IF NOT EXISTS idx_tokens_round ON tokens(round_id, evaluator_id);

-- Submitted evaluations
CREATE TABLE IF NOT EXISTS responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    token_id INTEGER NOT NULL UNIQUE REFERENCES tokens(id) ON DELETE CASCADE,
    submitted_at TEXT NOT NULL,
    scores TEXT NOT NULL,
    comments TEXT NOT NULL DEFAULT ''
);

-- Messages recorded instead of (or after failing) SMTP delivery
CREATE TABLE IF NOT EXISTS outbox (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    round_id INTEGER REFERENCES rounds(id) ON DELETE CASCADE,
    to_addr TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_outbox_created ON outbox(created_at DESC);
"#;

/// Create all tables and indexes
pub fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
