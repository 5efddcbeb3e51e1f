//! Round report assembly.
//!
//! Turns a round's responses into the three tables of the exported
//! workbook: raw feedback, aggregated scores, and comment summaries.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::model::{Response, Round, RubricItem, Student};
use crate::nlp::{detect_red_flags_all, simple_summarize, DEFAULT_MAX_SENTENCES};
use crate::scoring::{
    aggregate_scores, apply_curve, round2, weighted_percentage, Aggregation, Curve, CurveStats,
    EvaluationScore, StudentScore,
};
use crate::traits::Summarizer;

pub const RAW_SHEET: &str = "RawFeedback";
pub const SCORES_SHEET: &str = "Scores";
pub const SUMMARIES_SHEET: &str = "Summaries";

/// One submitted response with the people it is about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRow {
    pub evaluator: Student,
    pub evaluatee: Student,
    pub response: Response,
}

/// Everything the store hands over to build a round report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInput {
    pub round: Round,
    /// Current items of the round's rubric, in display order.
    pub rubric_items: Vec<RubricItem>,
    pub rows: Vec<FeedbackRow>,
}

/// Knobs for score aggregation and summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOptions {
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub curve: Option<Curve>,
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,
    /// Summaries requested at the same time.
    #[serde(default = "default_summary_concurrency")]
    pub summary_concurrency: usize,
}

/// Default number of in-flight summarizer calls.
pub const DEFAULT_SUMMARY_CONCURRENCY: usize = 4;

fn default_max_sentences() -> usize {
    DEFAULT_MAX_SENTENCES
}

fn default_summary_concurrency() -> usize {
    DEFAULT_SUMMARY_CONCURRENCY
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            aggregation: Aggregation::Mean,
            curve: None,
            max_sentences: DEFAULT_MAX_SENTENCES,
            summary_concurrency: DEFAULT_SUMMARY_CONCURRENCY,
        }
    }
}

/// Summary of one evaluatee's comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(default)]
    pub evaluatee_id: i64,
    pub evaluatee: String,
    pub team: String,
    pub summary: String,
    pub red_flags: Vec<String>,
    /// Which summarizer produced the text.
    pub summarizer: String,
}

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// A named sheet: a header row and data rows of the same width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetTable {
    fn new(name: &str, headers: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            headers,
            rows: Vec::new(),
        }
    }
}

/// A complete round report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    pub round_id: i64,
    pub round_name: String,
    pub generated_at: DateTime<Utc>,
    pub evaluations: Vec<EvaluationScore>,
    pub scores: Vec<StudentScore>,
    pub summaries: Vec<SummaryRow>,
    #[serde(default)]
    pub curve_stats: Option<CurveStats>,
    /// Sheets in workbook order: RawFeedback, Scores, Summaries.
    pub sheets: Vec<SheetTable>,
}

impl RoundReport {
    /// Default download name for the workbook.
    pub fn file_name(&self) -> String {
        format!("peer-eval-report-round-{}.xlsx", self.round_id)
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetTable> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }
}

/// Criterion columns of the raw sheet: the rubric's current items, then
/// criteria that only survive in response snapshots, by item id.
fn raw_columns(input: &ReportInput) -> Vec<(i64, String)> {
    let mut columns: Vec<(i64, String)> = input
        .rubric_items
        .iter()
        .map(|i| (i.id, i.column_header()))
        .collect();

    let mut retired: BTreeMap<i64, String> = BTreeMap::new();
    for entry in input.rows.iter().flat_map(|r| &r.response.scores) {
        if columns.iter().all(|(id, _)| *id != entry.item_id) {
            retired
                .entry(entry.item_id)
                .or_insert_with(|| format!("{} (score/{})", entry.criterion, entry.max_score));
        }
    }
    columns.extend(retired);
    columns
}

fn raw_table(input: &ReportInput) -> SheetTable {
    let columns = raw_columns(input);
    let mut headers: Vec<String> = [
        "Round",
        "Team",
        "Evaluator",
        "Evaluatee",
        "Submitted At",
        "Comments",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    headers.extend(columns.iter().map(|(_, header)| header.clone()));

    let mut table = SheetTable::new(RAW_SHEET, headers);
    for row in &input.rows {
        let mut cells: Vec<CellValue> = vec![
            input.round.name.as_str().into(),
            row.evaluatee.team.as_str().into(),
            row.evaluator.full_name().into(),
            row.evaluatee.full_name().into(),
            row.response.submitted_at.to_rfc3339().into(),
            row.response.comments.as_str().into(),
        ];
        for (item_id, _) in &columns {
            cells.push(match row.response.score_for(*item_id) {
                Some(score) => CellValue::Number(score as f64),
                None => CellValue::Empty,
            });
        }
        table.rows.push(cells);
    }
    table
}

fn scores_table(scores: &[StudentScore], curved: bool) -> SheetTable {
    let mut headers = vec![
        "Evaluatee".to_string(),
        "Team".to_string(),
        "Avg_Score_Pct".to_string(),
        "N_Evals".to_string(),
    ];
    if curved {
        headers.push("Curved_Score_Pct".to_string());
        headers.push("Letter_Grade".to_string());
    }

    let mut table = SheetTable::new(SCORES_SHEET, headers);
    for s in scores {
        let mut cells: Vec<CellValue> = vec![
            s.evaluatee.as_str().into(),
            s.team.as_str().into(),
            s.avg_score_pct.into(),
            (s.n_evals as f64).into(),
        ];
        if curved {
            cells.push(s.curved_score_pct.map_or(CellValue::Empty, CellValue::Number));
            cells.push(
                s.letter_grade
                    .clone()
                    .map_or(CellValue::Empty, CellValue::Text),
            );
        }
        table.rows.push(cells);
    }
    table
}

fn summaries_table(summaries: &[SummaryRow]) -> SheetTable {
    let headers = ["Evaluatee", "Team", "Summary", "Red Flags"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut table = SheetTable::new(SUMMARIES_SHEET, headers);
    for s in summaries {
        table.rows.push(vec![
            s.evaluatee.as_str().into(),
            s.team.as_str().into(),
            s.summary.as_str().into(),
            s.red_flags.join(", ").into(),
        ]);
    }
    table
}

/// Per-response weighted percentages, in input order.
pub fn evaluation_scores(rows: &[FeedbackRow]) -> Vec<EvaluationScore> {
    rows.iter()
        .map(|row| EvaluationScore {
            evaluatee_id: row.evaluatee.id,
            evaluatee: row.evaluatee.full_name(),
            team: row.evaluatee.team.clone(),
            evaluator: row.evaluator.full_name(),
            score_pct: round2(weighted_percentage(&row.response.scores)),
        })
        .collect()
}

async fn summarize_comments(
    rows: &[FeedbackRow],
    summarizer: &dyn Summarizer,
    max_sentences: usize,
    concurrency: usize,
) -> Vec<SummaryRow> {
    let mut grouped: BTreeMap<(String, String, i64), Vec<String>> = BTreeMap::new();
    for row in rows {
        let comment = row.response.comments.trim();
        if comment.is_empty() {
            continue;
        }
        grouped
            .entry((row.evaluatee.team.clone(), row.evaluatee.full_name(), row.evaluatee.id))
            .or_default()
            .push(comment.to_string());
    }

    let jobs = grouped.into_iter().map(|((team, evaluatee, evaluatee_id), comments)| async move {
        let red_flags = detect_red_flags_all(&comments)
            .into_iter()
            .map(String::from)
            .collect();
        let (summary, used) = match summarizer.summarize(&comments).await {
            Ok(text) => (text.trim().to_string(), summarizer.name().to_string()),
            Err(e) => {
                tracing::warn!(
                    evaluatee = %evaluatee,
                    summarizer = summarizer.name(),
                    "summarizer failed, using local summary: {e:#}"
                );
                (simple_summarize(&comments, max_sentences), "local".to_string())
            }
        };
        SummaryRow {
            evaluatee_id,
            evaluatee,
            team,
            summary,
            red_flags,
            summarizer: used,
        }
    });

    // `buffered` keeps the team/name order of the groups.
    stream::iter(jobs)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Build the full report for a round.
pub async fn build_report(
    input: &ReportInput,
    summarizer: &dyn Summarizer,
    options: &ReportOptions,
) -> RoundReport {
    let evaluations = evaluation_scores(&input.rows);
    let mut scores = aggregate_scores(&evaluations, options.aggregation);
    let curve_stats = options
        .curve
        .as_ref()
        .map(|curve| apply_curve(&mut scores, curve));

    let summaries = summarize_comments(
        &input.rows,
        summarizer,
        options.max_sentences,
        options.summary_concurrency,
    )
    .await;

    let sheets = vec![
        raw_table(input),
        scores_table(&scores, options.curve.is_some()),
        summaries_table(&summaries),
    ];

    tracing::info!(
        round = input.round.id,
        responses = input.rows.len(),
        students = scores.len(),
        "report built"
    );

    RoundReport {
        round_id: input.round.id,
        round_name: input.round.name.clone(),
        generated_at: Utc::now(),
        evaluations,
        scores,
        summaries,
        curve_stats,
        sheets,
    }
}
