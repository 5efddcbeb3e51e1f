//! CSV roster and rubric parser.
//!
//! Reads the two import formats, checks required columns, and validates
//! the parsed rows for common mistakes.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::ImportError;
use crate::model::{default_max_score, default_weight, normalize_email, NewRubricItem, NewStudent};

/// Required columns of the students CSV.
pub const STUDENT_COLUMNS: [&str; 4] = ["first_name", "last_name", "email", "team"];

/// Required columns of the rubric CSV. `description` is optional.
pub const RUBRIC_COLUMNS: [&str; 3] = ["criterion", "weight", "max_score"];

/// Sample roster shipped with peereval (6 students, 2 teams).
pub const STUDENTS_TEMPLATE: &str = include_str!("../../../templates/students.csv");

/// Sample rubric shipped with peereval (4 criteria).
pub const RUBRIC_TEMPLATE: &str = include_str!("../../../templates/rubric.csv");

/// Rows accepted from a roster import, plus the rows that were skipped.
#[derive(Debug, Clone, Default)]
pub struct ParsedRoster {
    pub students: Vec<NewStudent>,
    /// Line numbers of rows skipped for an empty email.
    pub skipped_lines: Vec<u64>,
}

/// Maps column name → index, after checking the required ones exist.
fn column_index(
    headers: &StringRecord,
    required: &[&str],
) -> Result<HashMap<String, usize>, ImportError> {
    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect();

    let missing: Vec<String> = required
        .iter()
        .filter(|c| !index.contains_key(**c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }

    Ok(index)
}

fn field<'r>(record: &'r StringRecord, index: &HashMap<String, usize>, name: &str) -> &'r str {
    index
        .get(name)
        .and_then(|&i| record.get(i))
        .unwrap_or("")
        .trim()
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn reader(content: &str) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes())
}

/// Parse a students CSV (`first_name,last_name,email,team`).
pub fn parse_students_str(content: &str) -> Result<ParsedRoster, ImportError> {
    let mut rdr = reader(content);
    let index = column_index(rdr.headers()?, &STUDENT_COLUMNS)?;

    let mut roster = ParsedRoster::default();
    for record in rdr.records() {
        let record = record?;
        let email = normalize_email(field(&record, &index, "email"));
        if email.is_empty() {
            roster.skipped_lines.push(line_of(&record));
            continue;
        }
        roster.students.push(NewStudent {
            first_name: field(&record, &index, "first_name").to_string(),
            last_name: field(&record, &index, "last_name").to_string(),
            email,
            team: field(&record, &index, "team").to_string(),
        });
    }

    Ok(roster)
}

/// Parse a rubric CSV (`criterion,description,weight,max_score`).
pub fn parse_rubric_str(content: &str) -> Result<Vec<NewRubricItem>, ImportError> {
    let mut rdr = reader(content);
    let index = column_index(rdr.headers()?, &RUBRIC_COLUMNS)?;

    let mut items = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = line_of(&record);

        let criterion = field(&record, &index, "criterion");
        if criterion.is_empty() {
            return Err(ImportError::InvalidRow {
                line,
                message: "criterion is required".into(),
            });
        }

        let weight = match field(&record, &index, "weight") {
            "" => default_weight(),
            raw => raw.parse::<f64>().map_err(|_| ImportError::InvalidRow {
                line,
                message: format!("weight must be a number, got '{raw}'"),
            })?,
        };
        if !weight.is_finite() || weight < 0.0 {
            return Err(ImportError::InvalidRow {
                line,
                message: format!("weight must be zero or positive, got {weight}"),
            });
        }

        let max_score = match field(&record, &index, "max_score") {
            "" => default_max_score(),
            raw => raw.parse::<i64>().map_err(|_| ImportError::InvalidRow {
                line,
                message: format!("max_score must be a whole number, got '{raw}'"),
            })?,
        };
        if max_score <= 0 {
            return Err(ImportError::InvalidRow {
                line,
                message: format!("max_score must be positive, got {max_score}"),
            });
        }

        let description = field(&record, &index, "description");
        items.push(NewRubricItem {
            criterion: criterion.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            weight,
            max_score,
        });
    }

    Ok(items)
}

/// Read and parse a students CSV file.
pub fn parse_students(path: &Path) -> Result<ParsedRoster> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read students file: {}", path.display()))?;
    parse_students_str(&content).with_context(|| format!("invalid students CSV: {}", path.display()))
}

/// Read and parse a rubric CSV file.
pub fn parse_rubric(path: &Path) -> Result<Vec<NewRubricItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rubric file: {}", path.display()))?;
    parse_rubric_str(&content).with_context(|| format!("invalid rubric CSV: {}", path.display()))
}

/// A non-fatal finding from import validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The row or entity the warning is about, if any.
    pub subject: Option<String>,
    pub message: String,
}

/// Check a parsed roster for problems that would produce a poor round.
pub fn validate_roster(roster: &ParsedRoster) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    for s in &roster.students {
        if !seen.insert(&s.email) {
            warnings.push(ValidationWarning {
                subject: Some(s.email.clone()),
                message: format!("duplicate email: {}", s.email),
            });
        }
        if s.team.is_empty() {
            warnings.push(ValidationWarning {
                subject: Some(s.email.clone()),
                message: "student has no team".into(),
            });
        }
    }

    let mut team_sizes: HashMap<&str, usize> = HashMap::new();
    for s in &roster.students {
        *team_sizes.entry(s.team.as_str()).or_default() += 1;
    }
    let mut teams: Vec<_> = team_sizes.into_iter().collect();
    teams.sort();
    for (team, size) in teams {
        if size < 2 && !team.is_empty() {
            warnings.push(ValidationWarning {
                subject: Some(team.to_string()),
                message: format!("team '{team}' has a single member and will get no evaluations"),
            });
        }
    }

    for line in &roster.skipped_lines {
        warnings.push(ValidationWarning {
            subject: None,
            message: format!("line {line} skipped: email is empty"),
        });
    }

    warnings
}

/// Check parsed rubric items for problems that would skew scoring.
pub fn validate_rubric(items: &[NewRubricItem]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if items.is_empty() {
        warnings.push(ValidationWarning {
            subject: None,
            message: "rubric has no criteria".into(),
        });
        return warnings;
    }

    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.criterion.to_lowercase()) {
            warnings.push(ValidationWarning {
                subject: Some(item.criterion.clone()),
                message: format!("duplicate criterion: {}", item.criterion),
            });
        }
    }

    if items.iter().all(|i| i.weight == 0.0) {
        warnings.push(ValidationWarning {
            subject: None,
            message: "all weights are zero; every score will be 0%".into(),
        });
    }

    warnings
}
