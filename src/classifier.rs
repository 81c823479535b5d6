//! Screen classification.
//!
//! One model call per step maps a screenshot to a `ScreenLabel`. When the
//! accessibility dump is available, marker strings in it override the model:
//! structure beats pixels for text-dependent screens.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::response::snippet;
use crate::vlm::{InferenceService, PromptKind};

/// Coarse state of the current screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenLabel {
    Welcome,
    Sync,
    Config,
    FolderSelect,
    Permission,
    FileBrowser,
    NewTab,
    Editor,
    Settings,
    Appearance,
    VaultOpen,
    Loading,
    Unknown,
}

impl ScreenLabel {
    pub const ALL: [ScreenLabel; 13] = [
        ScreenLabel::Welcome,
        ScreenLabel::Sync,
        ScreenLabel::Config,
        ScreenLabel::FolderSelect,
        ScreenLabel::Permission,
        ScreenLabel::FileBrowser,
        ScreenLabel::NewTab,
        ScreenLabel::Editor,
        ScreenLabel::Settings,
        ScreenLabel::Appearance,
        ScreenLabel::VaultOpen,
        ScreenLabel::Loading,
        ScreenLabel::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScreenLabel::Welcome => "welcome",
            ScreenLabel::Sync => "sync",
            ScreenLabel::Config => "config",
            ScreenLabel::FolderSelect => "folder_select",
            ScreenLabel::Permission => "permission",
            ScreenLabel::FileBrowser => "file_browser",
            ScreenLabel::NewTab => "new_tab",
            ScreenLabel::Editor => "editor",
            ScreenLabel::Settings => "settings",
            ScreenLabel::Appearance => "appearance",
            ScreenLabel::VaultOpen => "vault_open",
            ScreenLabel::Loading => "loading",
            ScreenLabel::Unknown => "unknown",
        }
    }

    /// Screens that only appear while a vault is open
    pub fn is_inside_vault(self) -> bool {
        matches!(
            self,
            ScreenLabel::FileBrowser
                | ScreenLabel::VaultOpen
                | ScreenLabel::Editor
                | ScreenLabel::NewTab
                | ScreenLabel::Settings
                | ScreenLabel::Appearance
        )
    }

    /// Screens of the first-run vault setup
    pub fn is_onboarding(self) -> bool {
        matches!(
            self,
            ScreenLabel::Welcome
                | ScreenLabel::Sync
                | ScreenLabel::Config
                | ScreenLabel::FolderSelect
                | ScreenLabel::Permission
        )
    }
}

impl fmt::Display for ScreenLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScreenLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let label = match normalized.as_str() {
            "welcome" => ScreenLabel::Welcome,
            "sync" => ScreenLabel::Sync,
            "config" | "naming" | "config/naming" => ScreenLabel::Config,
            "folder_select" => ScreenLabel::FolderSelect,
            "permission" => ScreenLabel::Permission,
            "file_browser" => ScreenLabel::FileBrowser,
            "new_tab" | "menu" | "new_tab/menu" => ScreenLabel::NewTab,
            "editor" => ScreenLabel::Editor,
            "settings" => ScreenLabel::Settings,
            "appearance" => ScreenLabel::Appearance,
            "vault_open" | "inside_vault" => ScreenLabel::VaultOpen,
            "loading" => ScreenLabel::Loading,
            "unknown" => ScreenLabel::Unknown,
            _ => return Err(format!("unknown screen label: {}", s)),
        };
        Ok(label)
    }
}

/// Accessibility text that forces a label when present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelOverride {
    pub marker: String,
    pub label: ScreenLabel,
}

impl LabelOverride {
    pub fn new(marker: impl Into<String>, label: ScreenLabel) -> Self {
        Self {
            marker: marker.into(),
            label,
        }
    }
}

/// Screen classifier with its override table
#[derive(Debug, Clone)]
pub struct ScreenClassifier {
    overrides: Vec<LabelOverride>,
}

impl Default for ScreenClassifier {
    fn default() -> Self {
        Self {
            overrides: vec![
                // A fresh note's title placeholder only exists in the editor
                LabelOverride::new("Untitled", ScreenLabel::Editor),
                LabelOverride::new("Continue without sync", ScreenLabel::Sync),
                LabelOverride::new("USE THIS FOLDER", ScreenLabel::FolderSelect),
            ],
        }
    }
}

impl ScreenClassifier {
    pub fn new(overrides: Vec<LabelOverride>) -> Self {
        Self { overrides }
    }

    /// Label the screen.
    ///
    /// Failures and out-of-enumeration replies resolve to `Unknown`.
    pub fn classify(
        &self,
        vlm: &dyn InferenceService,
        screenshot: &[u8],
        snapshot_text: Option<&str>,
    ) -> ScreenLabel {
        let primary = match vlm.infer(Some(screenshot), &classification_prompt(), 0.0) {
            Ok(reply) => parse_label(&reply).unwrap_or_else(|| {
                warn!(reply = %snippet(&reply), "classifier reply outside label set");
                ScreenLabel::Unknown
            }),
            Err(e) => {
                warn!(error = %e, "classifier call failed");
                ScreenLabel::Unknown
            }
        };

        match snapshot_text.and_then(|text| self.override_for(text)) {
            Some(forced) if forced != primary => {
                debug!(%primary, %forced, "accessibility marker overrides classifier");
                forced
            }
            _ => primary,
        }
    }

    /// First override whose marker appears in the dump, ignoring case
    pub fn override_for(&self, snapshot_text: &str) -> Option<ScreenLabel> {
        let text = snapshot_text.to_lowercase();
        self.overrides
            .iter()
            .find(|o| text.contains(&o.marker.to_lowercase()))
            .map(|o| o.label)
    }
}

/// Parse a classifier reply: the first non-empty line, stripped of quotes,
/// punctuation and a leading `label:`
pub fn parse_label(reply: &str) -> Option<ScreenLabel> {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '*' || c == '.')
        .trim();
    let line = match line.split_once(':') {
        Some((head, rest)) if head.trim().eq_ignore_ascii_case("label") => rest.trim(),
        _ => line,
    };
    line.trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '.')
        .parse()
        .ok()
}

fn classification_prompt() -> String {
    format!(
        r#"{role}
Look at the screenshot and answer with exactly ONE label from this list, nothing else:

welcome        - first-run screen offering "Create a vault"
sync           - prompt to set up sync, with "Continue without sync"
config         - vault naming screen: a text field for the vault name and a "Create a vault" button
folder_select  - system folder picker with a "Use this folder" button
permission     - system dialog asking to allow file access
file_browser   - vault file list: the vault name as a header AND the row of file-explorer icons (new note, new folder, sort)
new_tab        - an empty new tab or an open popup/overflow menu listing actions
editor         - a note open for editing: a title field AND a body area below it (empty or with text)
settings       - the settings screen listing option categories
appearance     - the Appearance settings page
vault_open     - inside a vault but none of the screens above
loading        - spinner, splash screen or blank frame
unknown        - anything else

Disambiguation:
- editor requires BOTH a title field and a body area; a list of notes is file_browser.
- file_browser requires the vault name header; a bare menu is new_tab.
- config shows a text input; welcome does not."#,
        role = PromptKind::Classify.role()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vlm::ScriptedInference;

    #[test]
    fn test_parse_label_variants() {
        assert_eq!(parse_label("editor"), Some(ScreenLabel::Editor));
        assert_eq!(parse_label("  `file_browser`\n"), Some(ScreenLabel::FileBrowser));
        assert_eq!(parse_label("Label: folder_select."), Some(ScreenLabel::FolderSelect));
        assert_eq!(parse_label("\"New Tab\""), Some(ScreenLabel::NewTab));
        assert_eq!(parse_label("config/naming"), Some(ScreenLabel::Config));
        assert_eq!(parse_label("dashboard"), None);
        assert_eq!(parse_label(""), None);
    }

    #[test]
    fn test_label_roundtrips_through_str() {
        for label in ScreenLabel::ALL {
            assert_eq!(label.as_str().parse::<ScreenLabel>(), Ok(label));
        }
    }

    #[test]
    fn test_model_label_used_without_snapshot() {
        let vlm = ScriptedInference::new().replies(PromptKind::Classify, ["sync"]);
        let label = ScreenClassifier::default().classify(&vlm, b"png", None);
        assert_eq!(label, ScreenLabel::Sync);
        assert_eq!(vlm.temperatures_for(PromptKind::Classify), vec![0.0]);
    }

    #[test]
    fn test_marker_overrides_model() {
        let vlm = ScriptedInference::new().replies(PromptKind::Classify, ["file_browser"]);
        let dump = r#"<node text="Untitled" clickable="true" bounds="[0,0][10,10]" />"#;
        let label = ScreenClassifier::default().classify(&vlm, b"png", Some(dump));
        assert_eq!(label, ScreenLabel::Editor);
    }

    #[test]
    fn test_marker_match_ignores_case() {
        let classifier = ScreenClassifier::default();
        let dump = r#"<node text="Use this folder" clickable="true" bounds="[0,0][10,10]" />"#;
        assert_eq!(classifier.override_for(dump), Some(ScreenLabel::FolderSelect));
        assert_eq!(classifier.override_for("USE THIS FOLDER"), Some(ScreenLabel::FolderSelect));
    }

    #[test]
    fn test_marker_overrides_failed_call() {
        let vlm = ScriptedInference::unavailable();
        let dump = r#"<node text="Continue without sync" />"#;
        let label = ScreenClassifier::default().classify(&vlm, b"png", Some(dump));
        assert_eq!(label, ScreenLabel::Sync);
    }

    #[test]
    fn test_failure_and_garbage_are_unknown() {
        let classifier = ScreenClassifier::default();
        assert_eq!(
            classifier.classify(&ScriptedInference::unavailable(), b"png", None),
            ScreenLabel::Unknown
        );
        let vlm = ScriptedInference::new().replies(PromptKind::Classify, ["I think this is a login page"]);
        assert_eq!(classifier.classify(&vlm, b"png", Some("<hierarchy/>")), ScreenLabel::Unknown);
    }

    #[test]
    fn test_custom_overrides_first_match_wins() {
        let classifier = ScreenClassifier::new(vec![
            LabelOverride::new("Appearance", ScreenLabel::Appearance),
            LabelOverride::new("Settings", ScreenLabel::Settings),
        ]);
        assert_eq!(
            classifier.override_for("Settings > Appearance"),
            Some(ScreenLabel::Appearance)
        );
        assert_eq!(classifier.override_for("nothing here"), None);
    }
}
