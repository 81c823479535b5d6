use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::device::DeviceError;
use crate::response::ParseError;
use crate::vlm::VlmError;

/// One goal to drive the application towards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Short identifier, also the artifact subdirectory name
    pub id: String,

    /// Natural-language goal
    pub goal: String,
}

impl TestCase {
    pub fn new(id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
        }
    }
}

/// The four Obsidian scenarios run when no suite file is given
pub fn default_suite() -> Vec<TestCase> {
    vec![
        TestCase::new("T1", "Create a new vault named 'InternVault' and open it"),
        TestCase::new("T2", "Create a new note titled 'Meeting Notes' with body 'Daily Standup'"),
        TestCase::new("T3", "Go to Settings and verify the Appearance tab icon is red"),
        TestCase::new(
            "T4",
            "Open any note, tap the three-dot menu, scroll down, and confirm 'Print to PDF' option is visible",
        ),
    ]
}

/// Load a suite from a JSON array of `{"id": ..., "goal": ...}`
pub fn load_suite(path: &Path) -> HarnessResult<Vec<TestCase>> {
    let raw = std::fs::read_to_string(path)?;
    let suite: Vec<TestCase> = serde_json::from_str(&raw)
        .map_err(|e| HarnessError::Config(format!("invalid suite file {}: {}", path.display(), e)))?;
    if suite.is_empty() {
        return Err(HarnessError::Config(format!("suite file {} has no tests", path.display())));
    }
    Ok(suite)
}

/// Phases of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Stepping,
    Verifying,
    Done,
}

/// Cooperative cancellation shared between a run and whoever may stop it.
///
/// Checked between steps; an in-flight device or inference call always runs
/// to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error types for harness operations
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Device bridge unreachable or a device call failed
    #[error("transport error: {0}")]
    Transport(#[from] DeviceError),

    /// Inference service call failed
    #[error("inference error: {0}")]
    Inference(#[from] VlmError),

    /// Model reply could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Every way of locating a target was tried
    #[error("{0}")]
    ResolutionExhausted(String),

    /// No usable device; the run cannot start
    #[error("{0}")]
    DeviceNotFound(String),

    /// The application under test could not be started
    #[error("failed to launch {0}")]
    LaunchFailed(String),

    /// Invalid configuration or input file
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
