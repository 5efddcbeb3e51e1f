//! Weighted scoring, per-student aggregation, and curving.
//!
//! A response's weighted percentage is
//! `100 × Σ(score_i / max_i × weight_i) / Σ(weight_i)` over the rubric
//! values snapshotted when it was submitted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::ScoreEntry;

/// Weighted percentage in `[0, 100]` for one response.
///
/// Returns 0 when the total weight is zero. Entries with a non-positive
/// max score contribute nothing but still count toward the total weight.
pub fn weighted_percentage(entries: &[ScoreEntry]) -> f64 {
    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    for e in entries {
        total_weight += e.weight;
        if e.max_score > 0 {
            weighted_sum += (e.score as f64 / e.max_score as f64) * e.weight;
        }
    }
    if total_weight <= 0.0 {
        return 0.0;
    }
    (weighted_sum / total_weight) * 100.0
}

/// Round to two decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// How per-response percentages are combined per evaluatee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
    /// Drop `fraction` of the values from each tail before averaging.
    TrimmedMean { fraction: f64 },
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Mean => write!(f, "mean"),
            Aggregation::Median => write!(f, "median"),
            Aggregation::TrimmedMean { fraction } => write!(f, "trimmed_mean({fraction})"),
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            "trimmed_mean" | "trimmed" => Ok(Aggregation::TrimmedMean { fraction: 0.1 }),
            other => Err(format!("unknown aggregation method: {other}")),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn trimmed_mean(values: &[f64], fraction: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if fraction <= 0.0 {
        return mean(values);
    }
    let k = (n as f64 * fraction) as usize;
    if k == 0 || 2 * k >= n {
        return mean(values);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    mean(&sorted[k..n - k])
}

impl Aggregation {
    /// Combine a set of percentages into one value.
    pub fn apply(&self, values: &[f64]) -> f64 {
        match *self {
            Aggregation::Mean => mean(values),
            Aggregation::Median => median(values),
            Aggregation::TrimmedMean { fraction } => trimmed_mean(values, fraction),
        }
    }
}

/// One response's contribution to the scores sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    /// Student id of the evaluatee; names are labels only.
    #[serde(default)]
    pub evaluatee_id: i64,
    pub evaluatee: String,
    pub team: String,
    pub evaluator: String,
    /// Weighted percentage, rounded to two decimals.
    pub score_pct: f64,
}

/// Aggregated score for one evaluatee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentScore {
    #[serde(default)]
    pub evaluatee_id: i64,
    pub evaluatee: String,
    pub team: String,
    pub avg_score_pct: f64,
    pub n_evals: u32,
    /// Set when a curve has been applied.
    #[serde(default)]
    pub curved_score_pct: Option<f64>,
    #[serde(default)]
    pub letter_grade: Option<String>,
}

/// Group per-response scores by evaluatee and aggregate them.
///
/// Output is sorted by team, then evaluatee name, then student id, so
/// namesakes on one team stay separate rows.
pub fn aggregate_scores(evals: &[EvaluationScore], method: Aggregation) -> Vec<StudentScore> {
    let mut grouped: BTreeMap<(String, String, i64), Vec<f64>> = BTreeMap::new();
    for e in evals {
        grouped
            .entry((e.team.clone(), e.evaluatee.clone(), e.evaluatee_id))
            .or_default()
            .push(e.score_pct);
    }

    grouped
        .into_iter()
        .map(|((team, evaluatee, evaluatee_id), values)| StudentScore {
            evaluatee_id,
            evaluatee,
            team,
            avg_score_pct: round2(method.apply(&values)),
            n_evals: values.len() as u32,
            curved_score_pct: None,
            letter_grade: None,
        })
        .collect()
}

/// Map a percentage to a letter grade using fixed bounds.
pub fn letter_grade(percent: f64) -> &'static str {
    if percent >= 90.0 {
        "A"
    } else if percent >= 80.0 {
        "B"
    } else if percent >= 70.0 {
        "C"
    } else if percent >= 60.0 {
        "D"
    } else {
        "E"
    }
}

/// Parameters of the grade curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// Averages at or above this are left alone.
    #[serde(default = "default_protect_threshold")]
    pub protect_threshold: f64,
    /// Pull factor toward the class mean, in `[0, 1]`.
    #[serde(default = "default_k")]
    pub k: f64,
}

fn default_protect_threshold() -> f64 {
    80.0
}

fn default_k() -> f64 {
    0.5
}

impl Default for Curve {
    fn default() -> Self {
        Self {
            protect_threshold: default_protect_threshold(),
            k: default_k(),
        }
    }
}

/// Class-level numbers computed while curving.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Curve aggregated scores in place: `raw + k × (mean − raw)` for averages
/// below the protect threshold, then assign letter grades.
pub fn apply_curve(scores: &mut [StudentScore], curve: &Curve) -> CurveStats {
    let raw: Vec<f64> = scores.iter().map(|s| s.avg_score_pct).collect();
    let class_mean = mean(&raw);
    let std_dev = if raw.is_empty() {
        0.0
    } else {
        (raw.iter().map(|x| (x - class_mean).powi(2)).sum::<f64>() / raw.len() as f64).sqrt()
    };

    for s in scores.iter_mut() {
        let x = s.avg_score_pct;
        let curved = if x >= curve.protect_threshold {
            x
        } else {
            x + curve.k * (class_mean - x)
        };
        let curved = round2(curved);
        s.curved_score_pct = Some(curved);
        s.letter_grade = Some(letter_grade(curved).to_string());
    }

    CurveStats {
        mean: class_mean,
        std_dev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(score: i64, max: i64, weight: f64) -> ScoreEntry {
        ScoreEntry {
            item_id: 0,
            criterion: "c".into(),
            score,
            max_score: max,
            weight,
        }
    }

    fn eval(evaluatee: &str, team: &str, pct: f64) -> EvaluationScore {
        EvaluationScore {
            evaluatee_id: 0,
            evaluatee: evaluatee.into(),
            team: team.into(),
            evaluator: "someone".into(),
            score_pct: pct,
        }
    }

    #[test]
    fn full_score_is_100_for_any_weights() {
        let weightings: [&[f64]; 4] = [&[1.0], &[2.0, 1.0, 1.5, 1.0], &[0.0, 3.0], &[0.25, 7.5, 100.0]];
        for weights in weightings {
            let entries: Vec<_> = weights
                .iter()
                .enumerate()
                .map(|(i, &w)| entry(3 + i as i64, 3 + i as i64, w))
                .collect();
            let pct = weighted_percentage(&entries);
            assert!((pct - 100.0).abs() < 1e-9, "weights {weights:?} gave {pct}");
        }
    }

    #[test]
    fn weighted_mix() {
        // (4/5)*2 + (2/4)*1 = 2.1 over weight 3 → 70%
        let pct = weighted_percentage(&[entry(4, 5, 2.0), entry(2, 4, 1.0)]);
        assert!((pct - 70.0).abs() < 1e-9);
    }

    #[test]
    fn zero_total_weight_is_zero() {
        assert_eq!(weighted_percentage(&[entry(5, 5, 0.0)]), 0.0);
        assert_eq!(weighted_percentage(&[]), 0.0);
    }

    #[test]
    fn zero_max_contributes_nothing() {
        let pct = weighted_percentage(&[entry(5, 5, 1.0), entry(3, 0, 1.0)]);
        assert!((pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_mean_sorted_by_team_then_name() {
        let evals = vec![
            eval("Zed", "Team A", 80.0),
            eval("Amy", "Team B", 90.0),
            eval("Zed", "Team A", 70.0),
            eval("Bob", "Team A", 100.0),
        ];
        let scores = aggregate_scores(&evals, Aggregation::Mean);
        let order: Vec<_> = scores.iter().map(|s| s.evaluatee.as_str()).collect();
        assert_eq!(order, vec!["Bob", "Zed", "Amy"]);
        assert_eq!(scores[1].avg_score_pct, 75.0);
        assert_eq!(scores[1].n_evals, 2);
    }

    #[test]
    fn namesakes_on_one_team_are_separate() {
        let evals = vec![
            EvaluationScore {
                evaluatee_id: 7,
                ..eval("Sam Lee", "Team A", 60.0)
            },
            EvaluationScore {
                evaluatee_id: 3,
                ..eval("Sam Lee", "Team A", 90.0)
            },
            EvaluationScore {
                evaluatee_id: 7,
                ..eval("Sam Lee", "Team A", 80.0)
            },
        ];
        let scores = aggregate_scores(&evals, Aggregation::Mean);
        assert_eq!(scores.len(), 2);
        assert_eq!((scores[0].evaluatee_id, scores[0].avg_score_pct), (3, 90.0));
        assert_eq!((scores[1].evaluatee_id, scores[1].avg_score_pct, scores[1].n_evals), (7, 70.0, 2));
    }

    #[test]
    fn median_and_trimmed_mean() {
        let values = [10.0, 20.0, 30.0, 100.0];
        assert_eq!(Aggregation::Median.apply(&values), 25.0);
        assert_eq!(
            Aggregation::TrimmedMean { fraction: 0.25 }.apply(&values),
            25.0
        );
        // Trimming everything falls back to the plain mean
        assert_eq!(
            Aggregation::TrimmedMean { fraction: 0.5 }.apply(&values),
            40.0
        );
        assert_eq!(
            Aggregation::TrimmedMean { fraction: 0.0 }.apply(&values),
            40.0
        );
    }

    #[test]
    fn aggregation_parse() {
        assert_eq!("mean".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert_eq!("Median".parse::<Aggregation>().unwrap(), Aggregation::Median);
        assert!(matches!(
            "trimmed_mean".parse::<Aggregation>().unwrap(),
            Aggregation::TrimmedMean { .. }
        ));
        assert!("mode".parse::<Aggregation>().is_err());
    }

    #[test]
    fn letter_grade_bounds() {
        assert_eq!(letter_grade(90.0), "A");
        assert_eq!(letter_grade(89.99), "B");
        assert_eq!(letter_grade(70.0), "C");
        assert_eq!(letter_grade(60.0), "D");
        assert_eq!(letter_grade(59.9), "E");
    }

    #[test]
    fn curve_lifts_low_scores_only() {
        let mut scores = aggregate_scores(
            &[eval("A", "T", 90.0), eval("B", "T", 60.0), eval("C", "T", 75.0)],
            Aggregation::Mean,
        );
        let stats = apply_curve(&mut scores, &Curve::default());
        assert_eq!(stats.mean, 75.0);

        let by_name = |n: &str| scores.iter().find(|s| s.evaluatee == n).unwrap();
        assert_eq!(by_name("A").curved_score_pct, Some(90.0));
        assert_eq!(by_name("A").letter_grade.as_deref(), Some("A"));
        assert_eq!(by_name("B").curved_score_pct, Some(67.5));
        assert_eq!(by_name("B").letter_grade.as_deref(), Some("D"));
        assert_eq!(by_name("C").curved_score_pct, Some(75.0));
    }
}
