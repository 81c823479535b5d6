//! Goal categorisation.
//!
//! The goal text is matched once, when the planner is created. Every later
//! decision dispatches on the resulting `GoalCategory`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static QUOTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"['"\u{2018}\u{201C}]([^'"\u{2019}\u{201D}]+)['"\u{2019}\u{201D}]"#)
        .expect("valid quoted-string regex")
});

const COLOURS: [&str; 10] = [
    "red", "green", "blue", "purple", "orange", "yellow", "black", "white", "gray", "grey",
];

/// Closed set of goal flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum GoalCategory {
    /// Walk the first-run setup and open a vault with the given name
    CreateVault { name: String },
    /// Create a note with a title and optional body
    CreateNote { title: String, body: Option<String> },
    /// Reach Settings > Appearance, optionally checking the tab icon colour
    OpenAppearance { expect_colour: Option<String> },
    /// Open a note's overflow menu and look for an item
    MenuItemVisible { item: String },
    /// Anything else
    Generic,
}

impl GoalCategory {
    pub fn name(&self) -> &'static str {
        match self {
            GoalCategory::CreateVault { .. } => "create_vault",
            GoalCategory::CreateNote { .. } => "create_note",
            GoalCategory::OpenAppearance { .. } => "open_appearance",
            GoalCategory::MenuItemVisible { .. } => "menu_item_visible",
            GoalCategory::Generic => "generic",
        }
    }
}

/// A goal and its category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Goal {
    pub text: String,
    pub category: GoalCategory,
}

impl Goal {
    /// Categorise a goal. `default_vault_name` is used when a vault goal
    /// names no vault.
    pub fn parse(text: &str, default_vault_name: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            category: categorize(text, default_vault_name),
        }
    }
}

/// Quoted substrings in order of appearance
pub fn quoted_strings(text: &str) -> Vec<String> {
    QUOTED_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn categorize(text: &str, default_vault_name: &str) -> GoalCategory {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |w: &str| words.contains(&w);
    let mut quoted = quoted_strings(text).into_iter();
    let creating = has("create") || has("new") || has("add");

    if has("note") && creating {
        let title = quoted.next().unwrap_or_else(|| "Untitled".to_string());
        return GoalCategory::CreateNote { title, body: quoted.next() };
    }
    if has("vault") && creating {
        let name = quoted.next().unwrap_or_else(|| default_vault_name.to_string());
        return GoalCategory::CreateVault { name };
    }
    if has("appearance") {
        let expect_colour = COLOURS.iter().find(|c| has(c)).map(|c| c.to_string());
        return GoalCategory::OpenAppearance { expect_colour };
    }
    if has("menu") {
        let item = quoted.next().unwrap_or_else(|| "Print to PDF".to_string());
        return GoalCategory::MenuItemVisible { item };
    }
    GoalCategory::Generic
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vault_goal() {
        assert_eq!(
            categorize("Create a new vault named 'InternVault' and open it", "Fallback"),
            GoalCategory::CreateVault { name: "InternVault".to_string() }
        );
        assert_eq!(
            categorize("create vault", "Fallback"),
            GoalCategory::CreateVault { name: "Fallback".to_string() }
        );
    }

    #[test]
    fn test_note_goal_with_curly_quotes() {
        assert_eq!(
            categorize("Create a new note titled \u{2018}Meeting Notes\u{2019} with body \u{201C}Daily Standup\u{201D}", "V"),
            GoalCategory::CreateNote {
                title: "Meeting Notes".to_string(),
                body: Some("Daily Standup".to_string()),
            }
        );
    }

    #[test]
    fn test_appearance_goal() {
        assert_eq!(
            categorize("Go to Settings > Appearance and confirm the tab is visible", "V"),
            GoalCategory::OpenAppearance { expect_colour: None }
        );
        assert_eq!(
            categorize("Go to Settings and verify the Appearance tab icon is Red", "V"),
            GoalCategory::OpenAppearance { expect_colour: Some("red".to_string()) }
        );
    }

    #[test]
    fn test_menu_goal() {
        assert_eq!(
            categorize(
                "Open any note, tap the three-dot menu, scroll down, and confirm 'Print to PDF' option is visible",
                "V"
            ),
            GoalCategory::MenuItemVisible { item: "Print to PDF".to_string() }
        );
    }

    #[test]
    fn test_everything_else_is_generic() {
        assert_eq!(categorize("open a note and confirm X is visible", "V"), GoalCategory::Generic);
        assert_eq!(categorize("", "V"), GoalCategory::Generic);
    }

    #[test]
    fn test_goal_keeps_trimmed_text() {
        let goal = Goal::parse("  Create vault 'A'  ", "V");
        assert_eq!(goal.text, "Create vault 'A'");
        assert_eq!(goal.category.name(), "create_vault");
    }
}
