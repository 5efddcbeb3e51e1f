//! Roster and rubric queries.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use peereval_core::model::{normalize_email, NewRubricItem, NewStudent, Rubric, RubricItem, Student};

use super::{Database, StoreError};

/// Result of a roster import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
}

/// Map a row whose columns start at `offset` with
/// `id, first_name, last_name, email, team`.
pub(crate) fn student_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(offset)?,
        first_name: row.get(offset + 1)?,
        last_name: row.get(offset + 2)?,
        email: row.get(offset + 3)?,
        team: row.get(offset + 4)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<RubricItem> {
    Ok(RubricItem {
        id: row.get(0)?,
        rubric_id: row.get(1)?,
        criterion: row.get(2)?,
        description: row.get(3)?,
        weight: row.get(4)?,
        max_score: row.get(5)?,
    })
}

/// Insert new students and update existing ones, keyed by email.
pub fn upsert_students(conn: &Connection, students: &[NewStudent]) -> Result<ImportSummary, StoreError> {
    let mut summary = ImportSummary::default();
    for s in students {
        let email = normalize_email(&s.email);
        if email.is_empty() {
            continue;
        }
        let updated = conn.execute(
            "UPDATE students SET first_name = ?1, last_name = ?2, team = ?3 WHERE email = ?4",
            params![s.first_name, s.last_name, s.team, email],
        )?;
        if updated > 0 {
            summary.updated += 1;
        } else {
            conn.execute(
                "INSERT INTO students (first_name, last_name, email, team) VALUES (?1, ?2, ?3, ?4)",
                params![s.first_name, s.last_name, email, s.team],
            )?;
            summary.added += 1;
        }
    }
    Ok(summary)
}

/// All students ordered by last name, then first name.
pub fn list_students(conn: &Connection) -> Result<Vec<Student>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, email, team FROM students ORDER BY last_name, first_name",
    )?;
    let students = stmt
        .query_map([], |row| student_at(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

/// Students grouped by team; members ordered by id.
pub fn students_by_team(conn: &Connection) -> Result<BTreeMap<String, Vec<Student>>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT id, first_name, last_name, email, team FROM students ORDER BY team, id")?;
    let mut teams: BTreeMap<String, Vec<Student>> = BTreeMap::new();
    for student in stmt.query_map([], |row| student_at(row, 0))? {
        let student = student?;
        teams.entry(student.team.clone()).or_default().push(student);
    }
    Ok(teams)
}

/// Create an active rubric with its items.
pub fn insert_rubric(conn: &Connection, name: &str, items: &[NewRubricItem]) -> Result<Rubric, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Invalid("rubric name is required".into()));
    }
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO rubrics (name, active, created_at) VALUES (?1, 1, ?2)",
        params![name, created_at],
    )?;
    let rubric_id = conn.last_insert_rowid();

    let mut rubric = Rubric {
        id: rubric_id,
        name: name.to_string(),
        active: true,
        created_at,
        items: Vec::with_capacity(items.len()),
    };
    for item in items {
        rubric.items.push(insert_rubric_item(conn, rubric_id, item)?);
    }
    Ok(rubric)
}

/// Append one criterion to a rubric.
pub fn insert_rubric_item(
    conn: &Connection,
    rubric_id: i64,
    item: &NewRubricItem,
) -> Result<RubricItem, StoreError> {
    if item.criterion.trim().is_empty() {
        return Err(StoreError::Invalid("criterion is required".into()));
    }
    if item.max_score <= 0 {
        return Err(StoreError::Invalid(format!(
            "max_score must be positive, got {}",
            item.max_score
        )));
    }
    if !item.weight.is_finite() || item.weight < 0.0 {
        return Err(StoreError::Invalid(format!(
            "weight must be zero or positive, got {}",
            item.weight
        )));
    }
    conn.execute(
        "INSERT INTO rubric_items (rubric_id, criterion, description, weight, max_score)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            rubric_id,
            item.criterion.trim(),
            item.description,
            item.weight,
            item.max_score
        ],
    )?;
    Ok(RubricItem {
        id: conn.last_insert_rowid(),
        rubric_id,
        criterion: item.criterion.trim().to_string(),
        description: item.description.clone(),
        weight: item.weight,
        max_score: item.max_score,
    })
}

/// Items of a rubric in insertion order.
pub fn rubric_items(conn: &Connection, rubric_id: i64) -> Result<Vec<RubricItem>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, rubric_id, criterion, description, weight, max_score
         FROM rubric_items WHERE rubric_id = ?1 ORDER BY id",
    )?;
    let items = stmt
        .query_map(params![rubric_id], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// A rubric with its items, if it exists.
pub fn get_rubric(conn: &Connection, rubric_id: i64) -> Result<Option<Rubric>, StoreError> {
    let rubric = conn
        .query_row(
            "SELECT id, name, active, created_at FROM rubrics WHERE id = ?1",
            params![rubric_id],
            |row| {
                Ok(Rubric {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    active: row.get::<_, i32>(2)? == 1,
                    created_at: row.get(3)?,
                    items: Vec::new(),
                })
            },
        )
        .optional()?;

    match rubric {
        Some(mut r) => {
            r.items = rubric_items(conn, r.id)?;
            Ok(Some(r))
        }
        None => Ok(None),
    }
}

/// All rubrics with their items, oldest first.
pub fn list_rubrics(conn: &Connection) -> Result<Vec<Rubric>, StoreError> {
    let ids: Vec<i64> = conn
        .prepare("SELECT id FROM rubrics ORDER BY id")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rubrics = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(r) = get_rubric(conn, id)? {
            rubrics.push(r);
        }
    }
    Ok(rubrics)
}

/// Delete a rubric and its items. Refused while any round uses it.
pub fn delete_rubric(conn: &Connection, rubric_id: i64) -> Result<(), StoreError> {
    let in_use: i64 = conn.query_row(
        "SELECT COUNT(*) FROM rounds WHERE rubric_id = ?1",
        params![rubric_id],
        |row| row.get(0),
    )?;
    if in_use > 0 {
        return Err(StoreError::RubricInUse(rubric_id));
    }
    let deleted = conn.execute("DELETE FROM rubrics WHERE id = ?1", params![rubric_id])?;
    if deleted == 0 {
        return Err(StoreError::not_found("rubric", rubric_id));
    }
    Ok(())
}

/// Delete a single rubric item.
pub fn delete_rubric_item(conn: &Connection, item_id: i64) -> Result<(), StoreError> {
    let deleted = conn.execute("DELETE FROM rubric_items WHERE id = ?1", params![item_id])?;
    if deleted == 0 {
        return Err(StoreError::not_found("rubric item", item_id));
    }
    Ok(())
}

impl Database {
    /// Upsert a parsed roster in one transaction.
    pub fn import_students(&self, students: &[NewStudent]) -> Result<ImportSummary, StoreError> {
        let summary = self.with_transaction(|tx| upsert_students(tx, students))?;
        tracing::info!(added = summary.added, updated = summary.updated, "roster imported");
        Ok(summary)
    }

    pub fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        self.with_connection(list_students)
    }

    /// Create a rubric and all its items in one transaction.
    pub fn create_rubric(&self, name: &str, items: &[NewRubricItem]) -> Result<Rubric, StoreError> {
        let rubric = self.with_transaction(|tx| insert_rubric(tx, name, items))?;
        tracing::info!(rubric = rubric.id, items = rubric.items.len(), "rubric created");
        Ok(rubric)
    }

    pub fn get_rubric(&self, rubric_id: i64) -> Result<Rubric, StoreError> {
        self.with_connection(|conn| get_rubric(conn, rubric_id))?
            .ok_or_else(|| StoreError::not_found("rubric", rubric_id))
    }

    pub fn list_rubrics(&self) -> Result<Vec<Rubric>, StoreError> {
        self.with_connection(list_rubrics)
    }

    pub fn delete_rubric(&self, rubric_id: i64) -> Result<(), StoreError> {
        self.with_connection(|conn| delete_rubric(conn, rubric_id))
    }

    pub fn add_rubric_item(&self, rubric_id: i64, item: &NewRubricItem) -> Result<RubricItem, StoreError> {
        self.with_connection(|conn| {
            if get_rubric(conn, rubric_id)?.is_none() {
                return Err(StoreError::not_found("rubric", rubric_id));
            }
            insert_rubric_item(conn, rubric_id, item)
        })
    }

    pub fn delete_rubric_item(&self, item_id: i64) -> Result<(), StoreError> {
        self.with_connection(|conn| delete_rubric_item(conn, item_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{roster, rubric_items, seeded};

    #[test]
    fn import_template_then_upsert() {
        let db = Database::open_in_memory().unwrap();
        let summary = db.import_students(&roster()).unwrap();
        assert_eq!(summary, ImportSummary { added: 6, updated: 0 });

        let mut changed = roster();
        changed[0].team = "Team C".into();
        changed[0].email = changed[0].email.to_uppercase();
        let summary = db.import_students(&changed).unwrap();
        assert_eq!(summary, ImportSummary { added: 0, updated: 6 });

        let students = db.list_students().unwrap();
        assert_eq!(students.len(), 6);
        let ada = students.iter().find(|s| s.first_name == "Ada").unwrap();
        assert_eq!(ada.team, "Team C");
        assert_eq!(ada.email, "ada.lovelace@example.edu");
    }

    #[test]
    fn list_students_sorted_by_last_name() {
        let (db, _) = seeded();
        let names: Vec<_> = db
            .list_students()
            .unwrap()
            .iter()
            .map(|s| s.last_name.clone())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn teams_grouped() {
        let (db, _) = seeded();
        let teams = db.with_connection(students_by_team).unwrap();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams["Team A"].len(), 3);
        assert_eq!(teams["Team B"].len(), 3);
    }

    #[test]
    fn rubric_roundtrip_and_items() {
        let db = Database::open_in_memory().unwrap();
        let rubric = db.create_rubric("Midterm", &rubric_items()).unwrap();
        assert_eq!(rubric.items.len(), 4);

        let loaded = db.get_rubric(rubric.id).unwrap();
        assert_eq!(loaded.name, "Midterm");
        assert!(loaded.active);
        assert_eq!(loaded.items, rubric.items);
        assert_eq!(loaded.total_weight(), 5.5);

        let extra = db
            .add_rubric_item(
                rubric.id,
                &NewRubricItem {
                    criterion: "Initiative".into(),
                    description: None,
                    weight: 1.0,
                    max_score: 3,
                },
            )
            .unwrap();
        assert_eq!(db.get_rubric(rubric.id).unwrap().items.len(), 5);

        db.delete_rubric_item(extra.id).unwrap();
        assert_eq!(db.get_rubric(rubric.id).unwrap().items.len(), 4);
        assert!(matches!(
            db.delete_rubric_item(extra.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn invalid_item_rejected() {
        let db = Database::open_in_memory().unwrap();
        let rubric = db.create_rubric("R", &[]).unwrap();
        let err = db
            .add_rubric_item(
                rubric.id,
                &NewRubricItem {
                    criterion: "Effort".into(),
                    description: None,
                    weight: 1.0,
                    max_score: 0,
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("max_score must be positive"));
        assert!(db.add_rubric_item(999, &rubric_items()[0]).is_err());
    }

    #[test]
    fn delete_rubric_cascades_items() {
        let db = Database::open_in_memory().unwrap();
        let rubric = db.create_rubric("Temp", &rubric_items()).unwrap();
        db.delete_rubric(rubric.id).unwrap();

        assert!(db.get_rubric(rubric.id).is_err());
        let orphans: i64 = db
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM rubric_items", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(orphans, 0);
        assert!(matches!(
            db.delete_rubric(rubric.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn rubric_in_use_cannot_be_deleted() {
        let (db, rubric_id) = seeded();
        db.start_round(Some("Sprint 1"), rubric_id).unwrap();
        assert!(matches!(
            db.delete_rubric(rubric_id),
            Err(StoreError::RubricInUse(id)) if id == rubric_id
        ));
    }
}
