//! Per-goal state machines.
//!
//! `next_step` is the planner's transition function: it takes the goal, the
//! current label and element index, and the progress so far, and returns
//! one step together with the updated progress. It makes no external calls;
//! steps that need the model (`Locate`, `Consult`) are resolved by the caller.

use crate::action::Action;
use crate::classifier::ScreenLabel;
use crate::config::PlannerSettings;
use crate::elements::ElementIndex;

use super::Target;
use super::goal::GoalCategory;
use super::progress::GoalProgress;

/// What the planner wants to happen next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A fully specified action
    Act(Action),
    /// Tap a target whose position still has to be worked out
    Locate(Target),
    /// Scroll the current list by one page
    Scroll,
    /// Ask the model for an action (generic goals)
    Consult,
}

/// Fallback for screens no flow handles: tap the first element, or wait if
/// there is nothing to tap
pub fn safe_default(elements: &ElementIndex) -> Action {
    if elements.is_empty() {
        Action::wait(1)
    } else {
        Action::tap_index(0)
    }
}

/// Wait issued when a label recurs after its one-shot transition already fired
const SETTLE_SECS: u32 = 2;

/// Sub-steps that act on the device fire at most once per run; a label that
/// recurs after its transition waits for the UI to move on instead.
pub fn next_step(
    goal: &GoalCategory,
    label: ScreenLabel,
    elements: &ElementIndex,
    progress: GoalProgress,
    settings: &PlannerSettings,
) -> (Step, GoalProgress) {
    if label == ScreenLabel::Loading {
        return (Step::Act(Action::wait(SETTLE_SECS)), progress);
    }

    match goal {
        GoalCategory::CreateVault { name } => vault_flow(name, label, elements, progress),
        GoalCategory::CreateNote { title, body } => {
            note_flow(title, body.as_deref(), label, elements, progress, settings)
        }
        GoalCategory::OpenAppearance { .. } => appearance_flow(label, elements, progress, settings),
        GoalCategory::MenuItemVisible { item } => menu_flow(item, label, elements, progress, settings),
        GoalCategory::Generic => (Step::Consult, progress),
    }
}

fn vault_flow(
    name: &str,
    label: ScreenLabel,
    elements: &ElementIndex,
    mut progress: GoalProgress,
) -> (Step, GoalProgress) {
    let step = match label {
        ScreenLabel::Welcome => Step::Locate(Target::CreateVaultButton),
        ScreenLabel::Sync => Step::Locate(Target::ContinueWithoutSync),
        ScreenLabel::Config => {
            if !progress.name_field_tapped {
                progress.name_field_tapped = true;
                Step::Locate(Target::VaultNameField)
            } else if !progress.name_typed {
                progress.name_typed = true;
                Step::Act(Action::type_text(name))
            } else if !progress.create_tapped {
                progress.create_tapped = true;
                Step::Locate(Target::CreateVaultButton)
            } else {
                Step::Act(Action::wait(SETTLE_SECS))
            }
        }
        ScreenLabel::FolderSelect => Step::Locate(Target::UseThisFolder),
        ScreenLabel::Permission => Step::Locate(Target::AllowAccess),
        l if l.is_inside_vault() => Step::Act(Action::Done),
        _ => Step::Act(safe_default(elements)),
    };
    (step, progress)
}

fn note_flow(
    title: &str,
    body: Option<&str>,
    label: ScreenLabel,
    elements: &ElementIndex,
    mut progress: GoalProgress,
    settings: &PlannerSettings,
) -> (Step, GoalProgress) {
    if label.is_onboarding() {
        return vault_flow(&settings.default_vault_name, label, elements, progress);
    }

    let note_finished = progress.title_committed && (body.is_none() || progress.body_typed);
    let step = match label {
        ScreenLabel::Editor => {
            if !progress.title_tapped {
                progress.title_tapped = true;
                Step::Locate(Target::NoteTitleField)
            } else if !progress.title_typed {
                progress.title_typed = true;
                Step::Act(Action::type_text(title))
            } else if !progress.title_committed {
                progress.title_committed = true;
                Step::Act(Action::press("enter"))
            } else if let Some(text) = body.filter(|_| !progress.body_typed) {
                progress.body_typed = true;
                Step::Act(Action::type_text(text))
            } else {
                Step::Act(Action::Done)
            }
        }
        ScreenLabel::FileBrowser | ScreenLabel::VaultOpen | ScreenLabel::NewTab => {
            if note_finished {
                Step::Act(Action::Done)
            } else if !progress.new_note_tapped {
                progress.new_note_tapped = true;
                Step::Locate(Target::NewNoteButton)
            } else {
                Step::Act(Action::wait(SETTLE_SECS))
            }
        }
        ScreenLabel::Settings | ScreenLabel::Appearance => Step::Act(Action::press("back")),
        _ => Step::Act(safe_default(elements)),
    };
    (step, progress)
}

fn appearance_flow(
    label: ScreenLabel,
    elements: &ElementIndex,
    mut progress: GoalProgress,
    settings: &PlannerSettings,
) -> (Step, GoalProgress) {
    if label.is_onboarding() {
        return vault_flow(&settings.default_vault_name, label, elements, progress);
    }

    let step = match label {
        ScreenLabel::FileBrowser | ScreenLabel::VaultOpen | ScreenLabel::Editor | ScreenLabel::NewTab => {
            if progress.settings_opened {
                Step::Act(Action::wait(SETTLE_SECS))
            } else {
                progress.settings_opened = true;
                Step::Locate(Target::SettingsButton)
            }
        }
        ScreenLabel::Settings => {
            let listed = elements.find_any_text(Target::AppearanceTab.needles()).is_some();
            if !listed && progress.scrolls < settings.max_scrolls {
                progress.scrolls += 1;
                Step::Scroll
            } else {
                Step::Locate(Target::AppearanceTab)
            }
        }
        ScreenLabel::Appearance => Step::Act(Action::Done),
        _ => Step::Act(safe_default(elements)),
    };
    (step, progress)
}

fn menu_flow(
    item: &str,
    label: ScreenLabel,
    elements: &ElementIndex,
    mut progress: GoalProgress,
    settings: &PlannerSettings,
) -> (Step, GoalProgress) {
    if label.is_onboarding() {
        return vault_flow(&settings.default_vault_name, label, elements, progress);
    }

    let step = match label {
        ScreenLabel::FileBrowser | ScreenLabel::VaultOpen => open_first_note(&mut progress),
        ScreenLabel::Editor if progress.menu_opened => Step::Act(Action::wait(SETTLE_SECS)),
        ScreenLabel::Editor => {
            progress.menu_opened = true;
            Step::Locate(Target::OverflowMenu)
        }
        ScreenLabel::NewTab if progress.menu_opened => {
            if elements.find_text(item).is_some() {
                Step::Act(Action::Done)
            } else if progress.scrolls < settings.max_scrolls {
                progress.scrolls += 1;
                Step::Scroll
            } else {
                progress.fail(format!(
                    "'{}' not found in menu after {} scrolls",
                    item, progress.scrolls
                ));
                Step::Act(Action::Failed)
            }
        }
        ScreenLabel::NewTab => open_first_note(&mut progress),
        ScreenLabel::Settings | ScreenLabel::Appearance => Step::Act(Action::press("back")),
        _ => Step::Act(safe_default(elements)),
    };
    (step, progress)
}

fn open_first_note(progress: &mut GoalProgress) -> Step {
    if progress.note_opened {
        Step::Act(Action::wait(SETTLE_SECS))
    } else {
        progress.note_opened = true;
        Step::Locate(Target::FirstNote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::scripted::hierarchy_for_buttons;
    use crate::elements::build_index;
    use pretty_assertions::assert_eq;

    fn settings() -> PlannerSettings {
        PlannerSettings::defaults()
    }

    fn index(buttons: &[&str]) -> ElementIndex {
        build_index(hierarchy_for_buttons(buttons).as_bytes())
    }

    /// Feed a label sequence through the transition function
    fn walk(goal: &GoalCategory, labels: &[ScreenLabel], elements: &ElementIndex) -> (Vec<Step>, GoalProgress) {
        let mut progress = GoalProgress::default();
        let mut steps = Vec::new();
        for label in labels {
            let (step, next) = next_step(goal, *label, elements, progress, &settings());
            steps.push(step);
            progress = next;
        }
        (steps, progress)
    }

    #[test]
    fn test_vault_flow_sub_steps_fire_once() {
        use ScreenLabel::*;
        let goal = GoalCategory::CreateVault { name: "InternVault".to_string() };
        let (steps, progress) = walk(
            &goal,
            &[Welcome, Sync, Config, Config, Config, FolderSelect, Permission, FileBrowser],
            &ElementIndex::empty(),
        );
        assert_eq!(
            steps,
            vec![
                Step::Locate(Target::CreateVaultButton),
                Step::Locate(Target::ContinueWithoutSync),
                Step::Locate(Target::VaultNameField),
                Step::Act(Action::type_text("InternVault")),
                Step::Locate(Target::CreateVaultButton),
                Step::Locate(Target::UseThisFolder),
                Step::Locate(Target::AllowAccess),
                Step::Act(Action::Done),
            ]
        );
        assert!(progress.name_field_tapped && progress.name_typed && progress.create_tapped);
    }

    #[test]
    fn test_repeated_config_never_retypes() {
        let goal = GoalCategory::CreateVault { name: "V".to_string() };
        let (steps, _) = walk(&goal, &[ScreenLabel::Config; 6], &ElementIndex::empty());
        let typed = steps
            .iter()
            .filter(|s| matches!(s, Step::Act(Action::Type { .. })))
            .count();
        assert_eq!(typed, 1);
    }

    #[test]
    fn test_note_flow_in_editor() {
        use ScreenLabel::*;
        let goal = GoalCategory::CreateNote {
            title: "Meeting Notes".to_string(),
            body: Some("Daily Standup".to_string()),
        };
        let (steps, _) = walk(&goal, &[FileBrowser, Editor, Editor, Editor, Editor, Editor], &ElementIndex::empty());
        assert_eq!(
            steps,
            vec![
                Step::Locate(Target::NewNoteButton),
                Step::Locate(Target::NoteTitleField),
                Step::Act(Action::type_text("Meeting Notes")),
                Step::Act(Action::press("enter")),
                Step::Act(Action::type_text("Daily Standup")),
                Step::Act(Action::Done),
            ]
        );
    }

    #[test]
    fn test_recurring_label_does_not_repeat_one_shot_taps() {
        use ScreenLabel::*;
        let settle = Step::Act(Action::wait(2));

        let note = GoalCategory::CreateNote { title: "T".to_string(), body: None };
        let (steps, _) = walk(&note, &[FileBrowser, FileBrowser], &ElementIndex::empty());
        assert_eq!(steps, vec![Step::Locate(Target::NewNoteButton), settle.clone()]);

        let vault = GoalCategory::CreateVault { name: "V".to_string() };
        let (steps, _) = walk(&vault, &[Config; 4], &ElementIndex::empty());
        assert_eq!(steps[2], Step::Locate(Target::CreateVaultButton));
        assert_eq!(steps[3], settle.clone());

        let appearance = GoalCategory::OpenAppearance { expect_colour: None };
        let (steps, _) = walk(&appearance, &[VaultOpen, Editor], &ElementIndex::empty());
        assert_eq!(steps, vec![Step::Locate(Target::SettingsButton), settle.clone()]);

        let menu = GoalCategory::MenuItemVisible { item: "Print to PDF".to_string() };
        let (steps, _) = walk(&menu, &[FileBrowser, NewTab, Editor, Editor], &ElementIndex::empty());
        assert_eq!(
            steps,
            vec![
                Step::Locate(Target::FirstNote),
                settle.clone(),
                Step::Locate(Target::OverflowMenu),
                settle,
            ]
        );
    }

    #[test]
    fn test_note_flow_onboards_with_default_vault() {
        let goal = GoalCategory::CreateNote { title: "T".to_string(), body: None };
        let (steps, _) = walk(&goal, &[ScreenLabel::Config, ScreenLabel::Config], &ElementIndex::empty());
        assert_eq!(steps[1], Step::Act(Action::type_text("InternVault")));
    }

    #[test]
    fn test_appearance_flow_scrolls_a_bounded_number_of_times() {
        use ScreenLabel::*;
        let goal = GoalCategory::OpenAppearance { expect_colour: None };
        let (steps, progress) = walk(
            &goal,
            &[FileBrowser, Settings, Settings, Settings, Settings, Appearance],
            &index(&["General", "Editor"]),
        );
        assert_eq!(steps[0], Step::Locate(Target::SettingsButton));
        assert_eq!(&steps[1..4], &[Step::Scroll, Step::Scroll, Step::Scroll]);
        assert_eq!(steps[4], Step::Locate(Target::AppearanceTab));
        assert_eq!(steps[5], Step::Act(Action::Done));
        assert_eq!(progress.scrolls, 3);
    }

    #[test]
    fn test_appearance_listed_skips_scrolling() {
        let goal = GoalCategory::OpenAppearance { expect_colour: None };
        let (steps, _) = walk(&goal, &[ScreenLabel::Settings], &index(&["General", "Appearance"]));
        assert_eq!(steps, vec![Step::Locate(Target::AppearanceTab)]);
    }

    #[test]
    fn test_menu_flow_finds_item() {
        use ScreenLabel::*;
        let goal = GoalCategory::MenuItemVisible { item: "Print to PDF".to_string() };
        let (steps, _) = walk(
            &goal,
            &[FileBrowser, Editor, NewTab],
            &index(&["Rename", "Print to PDF"]),
        );
        assert_eq!(
            steps,
            vec![
                Step::Locate(Target::FirstNote),
                Step::Locate(Target::OverflowMenu),
                Step::Act(Action::Done),
            ]
        );
    }

    #[test]
    fn test_menu_flow_fails_after_scrolls() {
        use ScreenLabel::*;
        let goal = GoalCategory::MenuItemVisible { item: "Print to PDF".to_string() };
        let (steps, progress) = walk(
            &goal,
            &[Editor, NewTab, NewTab, NewTab, NewTab],
            &index(&["Rename", "Delete"]),
        );
        assert_eq!(&steps[1..4], &[Step::Scroll, Step::Scroll, Step::Scroll]);
        assert_eq!(steps[4], Step::Act(Action::Failed));
        assert_eq!(
            progress.failure.as_deref(),
            Some("'Print to PDF' not found in menu after 3 scrolls")
        );
    }

    #[test]
    fn test_unknown_and_loading_are_safe() {
        let goal = GoalCategory::CreateVault { name: "V".to_string() };
        let (steps, _) = walk(&goal, &[ScreenLabel::Unknown, ScreenLabel::Loading], &index(&["Anything"]));
        assert_eq!(steps, vec![Step::Act(Action::tap_index(0)), Step::Act(Action::wait(2))]);

        let (steps, _) = walk(&goal, &[ScreenLabel::Unknown], &ElementIndex::empty());
        assert_eq!(steps, vec![Step::Act(Action::wait(1))]);
    }

    #[test]
    fn test_generic_goal_consults() {
        let (steps, _) = walk(&GoalCategory::Generic, &[ScreenLabel::Editor], &ElementIndex::empty());
        assert_eq!(steps, vec![Step::Consult]);
    }
}
