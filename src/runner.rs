//! Types for test run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::classifier::ScreenLabel;

/// Final outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail => write!(f, "FAIL"),
        }
    }
}

/// What happened during one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step number, starting at 1
    pub step: u32,

    /// Screen label, if the step got that far
    pub label: Option<ScreenLabel>,

    /// Action in its pipe-delimited form
    pub action: Option<String>,

    /// Whether the step's device work succeeded
    pub success: bool,

    pub error: Option<String>,

    /// Path to the step's screenshot, if it was written
    pub screenshot: Option<PathBuf>,
}

impl StepRecord {
    /// A step that failed before an action was chosen
    pub fn failed(step: u32, error: impl Into<String>) -> Self {
        Self {
            step,
            label: None,
            action: None,
            success: false,
            error: Some(error.into()),
            screenshot: None,
        }
    }
}

/// Result of a complete test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub test_id: String,
    pub goal: String,
    pub outcome: Outcome,
    /// Human-readable reason for the outcome
    pub reason: String,
    pub steps_taken: u32,
    /// Directory holding this run's artifacts
    pub artifacts_path: PathBuf,
    pub history: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    /// `T1 → PASS | reason`
    pub fn summary_line(&self) -> String {
        format!("{} → {} | {}", self.test_id, self.outcome, self.reason)
    }
}

/// Results of a suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<RunResult>,
}

impl SuiteSummary {
    pub fn from_results(results: Vec<RunResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
