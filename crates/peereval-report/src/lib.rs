//! peereval-report — writes round reports to disk.
//!
//! The workbook layout (sheet names, headers, rows) is decided by
//! `peereval_core::report`; this crate only serializes it.

pub mod xlsx;

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use peereval_core::report::RoundReport;

pub use xlsx::{workbook_bytes, write_workbook, XLSX_CONTENT_TYPE};

/// Output format of `peereval report`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Xlsx,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Json => "json",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ReportFormat::Xlsx),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// Write `report` to `path` in the given format.
pub fn write_report(report: &RoundReport, format: ReportFormat, path: &Path) -> Result<()> {
    match format {
        ReportFormat::Xlsx => write_workbook(report, path),
        ReportFormat::Json => report.save_json(path),
    }
}
