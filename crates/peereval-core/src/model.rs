//! Core data model types for peereval.
//!
//! Rows as the store hands them out, plus the import and submission shapes
//! that flow into it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A student on the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Trimmed, lower-cased; unique across the roster.
    pub email: String,
    pub team: String,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A roster row parsed from CSV, before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub team: String,
}

/// Normalize an email address for use as the roster key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A named set of weighted criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<RubricItem>,
}

impl Rubric {
    /// Sum of all item weights.
    pub fn total_weight(&self) -> f64 {
        self.items.iter().map(|i| i.weight).sum()
    }
}

/// A single criterion of a rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    pub id: i64,
    pub rubric_id: i64,
    pub criterion: String,
    #[serde(default)]
    pub description: Option<String>,
    pub weight: f64,
    pub max_score: i64,
}

impl RubricItem {
    /// Column header used for this criterion in the raw feedback sheet.
    pub fn column_header(&self) -> String {
        format!("{} (score/{})", self.criterion, self.max_score)
    }
}

/// A rubric criterion parsed from CSV or entered by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRubricItem {
    pub criterion: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_max_score")]
    pub max_score: i64,
}

pub fn default_weight() -> f64 {
    1.0
}

pub fn default_max_score() -> i64 {
    5
}

/// Lifecycle state of an evaluation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Open,
    Closed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Open => write!(f, "open"),
            RoundStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for RoundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" | "active" => Ok(RoundStatus::Open),
            "closed" => Ok(RoundStatus::Closed),
            other => Err(format!("unknown round status: {other}")),
        }
    }
}

/// One evaluation cycle tied to a rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: i64,
    pub name: String,
    pub rubric_id: i64,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
}

impl Round {
    pub fn is_open(&self) -> bool {
        self.status == RoundStatus::Open
    }
}

/// A round with its progress counts, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: Round,
    pub rubric_name: String,
    pub token_count: u32,
    pub submitted_count: u32,
}

/// A single-use link pairing an evaluator with an evaluatee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalToken {
    pub id: i64,
    pub token: String,
    pub round_id: i64,
    pub evaluator_id: i64,
    pub evaluatee_id: i64,
    pub sent_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl EvalToken {
    pub fn is_consumed(&self) -> bool {
        self.submitted_at.is_some()
    }
}

/// A token joined with the people it pairs; the unit the dispatcher and
/// link listings work with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub token: EvalToken,
    pub evaluator: Student,
    pub evaluatee: Student,
}

/// One criterion score of a response, with the rubric values in force
/// when it was submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub item_id: i64,
    pub criterion: String,
    pub score: i64,
    pub max_score: i64,
    pub weight: f64,
}

/// A submitted evaluation. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: i64,
    pub token_id: i64,
    pub submitted_at: DateTime<Utc>,
    pub scores: Vec<ScoreEntry>,
    #[serde(default)]
    pub comments: String,
}

impl Response {
    /// Score recorded for a rubric item, if the item was part of the rubric
    /// at submission time.
    pub fn score_for(&self, item_id: i64) -> Option<i64> {
        self.scores
            .iter()
            .find(|s| s.item_id == item_id)
            .map(|s| s.score)
    }
}

/// What an evaluator sends in for one token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    /// Rubric item id → raw score. Out-of-range values are clamped.
    #[serde(default)]
    pub scores: std::collections::HashMap<i64, i64>,
    #[serde(default)]
    pub comments: String,
}

/// Everything needed to render a submission form for a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationForm {
    pub round_name: String,
    pub evaluator: String,
    pub evaluatee: String,
    pub items: Vec<RubricItem>,
}

/// A message recorded in the in-app outbox instead of (or after failing)
/// SMTP delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub round_id: Option<i64>,
    pub to_addr: String,
    pub subject: String,
    pub body: String,
}
