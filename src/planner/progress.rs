//! Per-run goal progress.
//!
//! `GoalProgress` is a plain value: the planner hands it to the transition
//! function and stores whatever comes back. A new run starts from
//! `GoalProgress::default()`.

use serde::Serialize;
use std::collections::BTreeMap;

use super::Target;

/// Attempts spent locating one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefineState {
    /// Structured coordinate queries issued
    pub structured: u32,
    /// Offset probes tapped
    pub probes: u32,
}

impl RefineState {
    pub fn total(&self) -> u32 {
        self.structured + self.probes
    }
}

/// Sub-step flags for one goal execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GoalProgress {
    // vault setup
    pub name_field_tapped: bool,
    pub name_typed: bool,
    pub create_tapped: bool,

    // note creation
    pub new_note_tapped: bool,
    pub title_tapped: bool,
    pub title_typed: bool,
    pub title_committed: bool,
    pub body_typed: bool,

    // navigation
    pub settings_opened: bool,
    pub note_opened: bool,
    pub menu_opened: bool,
    pub scrolls: u32,

    pub refine: BTreeMap<Target, RefineState>,
    /// Set when the planner gives up
    pub failure: Option<String>,
}

impl GoalProgress {
    pub fn refine_state(&self, target: Target) -> RefineState {
        self.refine.get(&target).copied().unwrap_or_default()
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }
}
