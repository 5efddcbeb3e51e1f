//! The `peereval validate` command.

use std::path::PathBuf;

use anyhow::Result;

use peereval_core::parser::{self, ValidationWarning};

fn print_warnings(warnings: &[ValidationWarning]) {
    for w in warnings {
        let prefix = w
            .subject
            .as_ref()
            .map(|s| format!("  [{s}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }
}

pub fn execute(students: Option<PathBuf>, rubric: Option<PathBuf>) -> Result<()> {
    anyhow::ensure!(
        students.is_some() || rubric.is_some(),
        "nothing to validate: pass --students and/or --rubric"
    );

    let mut total_warnings = 0;

    if let Some(path) = &students {
        let roster = parser::parse_students(path)?;
        let teams: std::collections::BTreeSet<&str> =
            roster.students.iter().map(|s| s.team.as_str()).collect();
        println!(
            "Students: {} ({} students, {} teams)",
            path.display(),
            roster.students.len(),
            teams.len()
        );
        let warnings = parser::validate_roster(&roster);
        print_warnings(&warnings);
        total_warnings += warnings.len();
    }

    if let Some(path) = &rubric {
        let items = parser::parse_rubric(path)?;
        let total_weight: f64 = items.iter().map(|i| i.weight).sum();
        println!(
            "Rubric: {} ({} criteria, total weight {total_weight})",
            path.display(),
            items.len()
        );
        let warnings = parser::validate_rubric(&items);
        print_warnings(&warnings);
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All files valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
