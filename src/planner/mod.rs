//! Planner: one instance per goal per run.
//!
//! The goal is categorised once at construction. Each call to
//! `decide_next_action` runs the pure transition in [`flows`] and then
//! resolves whatever needs the outside world: targets go through
//! [`refine`], scrolls get the screenshot's size, and generic goals may ask
//! the model for an action.

pub mod flows;
pub mod goal;
pub mod progress;
pub mod refine;

pub use flows::{Step, next_step, safe_default};
pub use goal::{Goal, GoalCategory};
pub use progress::{GoalProgress, RefineState};
pub use refine::{Refiner, screen_size};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::action::Action;
use crate::classifier::ScreenLabel;
use crate::config::{DeviceProfile, PlannerSettings};
use crate::elements::ElementIndex;
use crate::response::snippet;
use crate::vlm::{InferenceService, PromptKind};

/// Something the planner needs to tap but may not find in the element index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    CreateVaultButton,
    ContinueWithoutSync,
    VaultNameField,
    UseThisFolder,
    AllowAccess,
    NewNoteButton,
    NoteTitleField,
    SettingsButton,
    AppearanceTab,
    OverflowMenu,
    FirstNote,
}

impl Target {
    pub const ALL: [Target; 11] = [
        Target::CreateVaultButton,
        Target::ContinueWithoutSync,
        Target::VaultNameField,
        Target::UseThisFolder,
        Target::AllowAccess,
        Target::NewNoteButton,
        Target::NoteTitleField,
        Target::SettingsButton,
        Target::AppearanceTab,
        Target::OverflowMenu,
        Target::FirstNote,
    ];

    /// Element texts that identify the target, most specific first
    pub fn needles(self) -> &'static [&'static str] {
        match self {
            Target::CreateVaultButton => &["Create a vault", "Create vault"],
            Target::ContinueWithoutSync => &["Continue without sync"],
            Target::VaultNameField => &["Vault name", "My vault"],
            Target::UseThisFolder => &["Use this folder"],
            Target::AllowAccess => &["Allow"],
            Target::NewNoteButton => &["Create new note", "New note"],
            Target::NoteTitleField => &["Untitled"],
            Target::SettingsButton => &["Settings"],
            Target::AppearanceTab => &["Appearance"],
            Target::OverflowMenu => &["More options"],
            // Note names are arbitrary
            Target::FirstNote => &[],
        }
    }

    /// Phrase used in locate prompts and failure reasons
    pub fn description(self) -> &'static str {
        match self {
            Target::CreateVaultButton => "the 'Create a vault' button",
            Target::ContinueWithoutSync => "the 'Continue without sync' button",
            Target::VaultNameField => "the vault name text field",
            Target::UseThisFolder => "the 'Use this folder' button",
            Target::AllowAccess => "the 'Allow' button of the permission dialog",
            Target::NewNoteButton => "the 'Create new note' button",
            Target::NoteTitleField => "the note title field",
            Target::SettingsButton => "the Settings (gear) button",
            Target::AppearanceTab => "the 'Appearance' entry in Settings",
            Target::OverflowMenu => "the three-dot overflow menu button",
            Target::FirstNote => "the first note in the file list",
        }
    }
}

pub struct Planner {
    goal: Goal,
    progress: GoalProgress,
    settings: PlannerSettings,
    profile: DeviceProfile,
    free_planner: bool,
}

impl Planner {
    pub fn new(goal: &str, settings: &PlannerSettings, profile: &DeviceProfile, free_planner: bool) -> Self {
        let goal = Goal::parse(goal, &settings.default_vault_name);
        debug!(category = goal.category.name(), "goal categorised");
        Self {
            goal,
            progress: GoalProgress::default(),
            settings: settings.clone(),
            profile: profile.clone(),
            free_planner,
        }
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn progress(&self) -> &GoalProgress {
        &self.progress
    }

    /// Why the planner gave up, once it has
    pub fn failure_reason(&self) -> Option<&str> {
        self.progress.failure.as_deref()
    }

    /// Decide exactly one action for the current screen.
    ///
    /// `elements` must come from this step's accessibility dump.
    pub fn decide_next_action(
        &mut self,
        vlm: &dyn InferenceService,
        label: ScreenLabel,
        elements: &ElementIndex,
        screenshot: &[u8],
    ) -> Action {
        let progress = std::mem::take(&mut self.progress);
        let (step, progress) = next_step(&self.goal.category, label, elements, progress, &self.settings);

        let (action, progress) = match step {
            Step::Act(action) => (action, progress),
            Step::Locate(target) => Refiner::new(vlm, &self.settings, &self.profile)
                .resolve(target, elements, screenshot, progress),
            Step::Scroll => {
                let (w, h) = screen_size(screenshot).unwrap_or((self.profile.width, self.profile.height));
                (Action::scroll_up(w, h), progress)
            }
            Step::Consult if self.free_planner => (self.consult(vlm, label, elements, screenshot), progress),
            Step::Consult => (safe_default(elements), progress),
        };
        self.progress = progress;
        action
    }

    /// Ask the model for one action line; anything unusable becomes the
    /// safe default
    fn consult(
        &self,
        vlm: &dyn InferenceService,
        label: ScreenLabel,
        elements: &ElementIndex,
        screenshot: &[u8],
    ) -> Action {
        let prompt = plan_prompt(&self.goal.text, label, elements);
        let reply = match vlm.infer(Some(screenshot), &prompt, 0.2) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "planning call failed");
                return safe_default(elements);
            }
        };
        let parsed = reply
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .and_then(|line| line.parse::<Action>().ok());
        match parsed {
            // The model may not give up on our behalf
            Some(Action::Failed) | None => {
                warn!(reply = %snippet(&reply), "unusable planning reply");
                safe_default(elements)
            }
            Some(Action::Wait { seconds }) if seconds > self.settings.max_wait_secs => {
                warn!(seconds, max = self.settings.max_wait_secs, "requested wait clamped");
                Action::wait(self.settings.max_wait_secs)
            }
            Some(action) => action,
        }
    }
}

fn plan_prompt(goal: &str, label: ScreenLabel, elements: &ElementIndex) -> String {
    let listing = if elements.is_empty() {
        "(no interactable elements reported)".to_string()
    } else {
        elements.describe()
    };
    format!(
        r#"{role}
Goal: {goal}
Current screen: {label}
Interactable elements (index: text @ center):
{listing}

Do NOT explain. Output ONLY one action string:
- tap|X|Y
- tap_index|I
- type|TEXT
- swipe|X1|Y1|X2|Y2|DURATION_MS
- press|home/back/enter/tab/escape/delete/menu
- wait|SECONDS
- DONE"#,
        role = PromptKind::Plan.role(),
    )
}
