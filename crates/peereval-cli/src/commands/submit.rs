//! The `peereval submit` command.

use std::collections::HashMap;

use anyhow::{Context as _, Result};

use peereval_core::model::{RubricItem, Submission};
use peereval_core::scoring::{round2, weighted_percentage};

use super::Context;

/// Parse `ITEM=SCORE` pairs, resolving ITEM as an item id or a criterion
/// name (case-insensitive).
fn parse_scores(pairs: &[String], items: &[RubricItem]) -> Result<HashMap<i64, i64>> {
    let mut scores = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid score '{pair}', expected ITEM=SCORE"))?;
        let key = key.trim();
        let score: i64 = value
            .trim()
            .parse()
            .with_context(|| format!("invalid score value in '{pair}'"))?;

        let item = items
            .iter()
            .find(|i| key.parse::<i64>().ok() == Some(i.id) || i.criterion.eq_ignore_ascii_case(key))
            .with_context(|| format!("no criterion '{key}' in this round's rubric"))?;
        scores.insert(item.id, score);
    }
    Ok(scores)
}

pub fn execute(ctx: &Context, token: &str, pairs: &[String], comments: String) -> Result<()> {
    let form = ctx.db.evaluation_form(token)?;
    let submission = Submission {
        scores: parse_scores(pairs, &form.items)?,
        comments,
    };

    let response = ctx.db.submit(token, &submission)?;
    println!(
        "Recorded evaluation of {} by {} ({}%).",
        form.evaluatee,
        form.evaluator,
        round2(weighted_percentage(&response.scores))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<RubricItem> {
        vec![
            RubricItem {
                id: 3,
                rubric_id: 1,
                criterion: "Contribution".into(),
                description: None,
                weight: 2.0,
                max_score: 5,
            },
            RubricItem {
                id: 4,
                rubric_id: 1,
                criterion: "Communication".into(),
                description: None,
                weight: 1.0,
                max_score: 5,
            },
        ]
    }

    #[test]
    fn scores_by_id_or_name() {
        let pairs = vec!["3=4".to_string(), "communication = 5".to_string()];
        let scores = parse_scores(&pairs, &items()).unwrap();
        assert_eq!(scores[&3], 4);
        assert_eq!(scores[&4], 5);
    }

    #[test]
    fn bad_pairs_rejected() {
        assert!(parse_scores(&["3".to_string()], &items()).is_err());
        assert!(parse_scores(&["3=x".to_string()], &items()).is_err());
        let err = parse_scores(&["Initiative=2".to_string()], &items()).unwrap_err();
        assert!(err.to_string().contains("Initiative"));
    }
}
