//! Goal verification.
//!
//! One model call per check, at temperature 0, with a prompt chosen by goal
//! category. The reply is parsed leniently. Anything that cannot be read
//! as a verdict counts as "not complete yet", never as an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::harness::HarnessError;
use crate::planner::{Goal, GoalCategory};
use crate::response::{lenient_bool, lenient_str, parse_json_object};
use crate::vlm::{InferenceService, PromptKind};

/// Why a completed goal failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    ElementNotFound,
    NavigationTimeout,
    FocusError,
    ColorMismatch,
}

impl FailureKind {
    /// Parse a taxonomy name, tolerating case and separators
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "elementnotfound" => Some(FailureKind::ElementNotFound),
            "navigationtimeout" => Some(FailureKind::NavigationTimeout),
            "focuserror" => Some(FailureKind::FocusError),
            "colormismatch" | "colourmismatch" => Some(FailureKind::ColorMismatch),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Structured judgment of one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub completed: bool,
    pub pass: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_expected_state: Option<String>,
}

impl Verdict {
    /// Not complete, with an explanation
    pub fn incomplete(reason: impl Into<String>) -> Self {
        Self {
            completed: false,
            pass: false,
            failure_kind: None,
            reason: reason.into(),
            next_expected_state: None,
        }
    }

    /// Read a verdict from a model reply
    pub fn from_reply(reply: &str) -> Self {
        let map = match parse_json_object(reply) {
            Ok((map, strategy)) => {
                debug!(?strategy, "parsed verifier reply");
                map
            }
            Err(e) => {
                let err = HarnessError::from(e);
                warn!(error = %err, "unparseable verifier reply");
                return Verdict::incomplete(format!("unparseable verifier response: {}", err));
            }
        };

        let completed = lenient_bool(&map, "completed").unwrap_or(false);
        let pass = completed && lenient_bool(&map, "pass").unwrap_or(false);
        let failure_kind = ["failure_type", "failureKind", "failure_kind"]
            .iter()
            .find_map(|key| lenient_str(&map, key))
            .and_then(FailureKind::parse)
            .filter(|_| completed && !pass);
        let next_expected_state = lenient_str(&map, "next_expected_state")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut reason = lenient_str(&map, "reason").unwrap_or_default().to_string();
        if !completed && reason.is_empty() {
            if let Some(next) = &next_expected_state {
                reason = format!("next expected state: {}", next);
            }
        }

        Verdict { completed, pass, failure_kind, reason, next_expected_state }
    }
}

pub struct Verifier<'a> {
    vlm: &'a dyn InferenceService,
}

impl<'a> Verifier<'a> {
    pub fn new(vlm: &'a dyn InferenceService) -> Self {
        Self { vlm }
    }

    /// Judge whether `screenshot` shows the goal satisfied
    pub fn verify(&self, goal: &Goal, screenshot: &[u8]) -> Verdict {
        let prompt = verification_prompt(goal);
        match self.vlm.infer(Some(screenshot), &prompt, 0.0) {
            Ok(reply) => Verdict::from_reply(&reply),
            Err(e) => {
                let err = HarnessError::from(e);
                warn!(error = %err, "verifier call failed");
                Verdict::incomplete(format!("verifier call failed: {}", err))
            }
        }
    }
}

const JSON_ONLY: &str = "Return ONLY a raw JSON object, no code fences, no extra text. Decide dynamically based on the screenshot:";

/// Goal-specific verification prompt
pub fn verification_prompt(goal: &Goal) -> String {
    let role = PromptKind::Verify.role();
    match &goal.category {
        GoalCategory::OpenAppearance { expect_colour: Some(colour) } => format!(
            r#"{role} Verify that the Settings > Appearance page is open and the 'Appearance' tab icon is {colour}.
{JSON_ONLY}

- If the page is not open yet: {{ "completed": false, "next_expected_state": "<settings|appearance>" }}
- If the icon is {colour}: {{ "completed": true, "pass": true, "reason": "Appearance tab icon is {colour}" }}
- If the icon is another colour: {{ "completed": true, "pass": false, "failure_type": "ColorMismatch", "reason": "Appearance tab icon is <actual colour>" }}"#
        ),
        GoalCategory::OpenAppearance { expect_colour: None } => format!(
            r#"{role} Verify that the Settings > Appearance page is open.
{JSON_ONLY}

- If it is open: {{ "completed": true, "pass": true, "reason": "<evidence>" }}
- If it is not open yet: {{ "completed": false, "next_expected_state": "<settings|appearance>" }}"#
        ),
        GoalCategory::MenuItemVisible { item } => format!(
            r#"{role} Verify whether an open overflow menu contains an option labeled '{item}'.
{JSON_ONLY}

- If no menu is open yet: {{ "completed": false, "next_expected_state": "<note|menu>" }}
- If visible: {{ "completed": true, "pass": true, "reason": "'{item}' is visible in the menu" }}
- If the menu is fully shown and the option is missing: {{ "completed": true, "pass": false, "failure_type": "ElementNotFound", "reason": "'{item}' is missing from the menu" }}"#
        ),
        GoalCategory::CreateNote { title, body } => {
            let body_rule = match body {
                Some(body) => format!(" and the body text reads exactly '{}'", body),
                None => String::new(),
            };
            format!(
                r#"{role} Verify that a note titled exactly '{title}'{body_rule} is open in the editor.
{JSON_ONLY}

- If both match exactly: {{ "completed": true, "pass": true, "reason": "<evidence>" }}
- If the note exists but the text differs: {{ "completed": true, "pass": false, "failure_type": "<ElementNotFound|FocusError>", "reason": "<what differs>" }}
- If the note is not written yet: {{ "completed": false, "next_expected_state": "<welcome|sync|naming|inside_vault|editor>" }}"#
            )
        }
        GoalCategory::CreateVault { .. } | GoalCategory::Generic => format!(
            r#"{role} Verify if the AGENT advanced along this sequence:

1) Welcome screen with "Create a vault"
2) Sync prompt with "Continue without sync"
3) Vault naming screen (text field + "Create a vault" button)
4) Inside vault (file explorer or editor)

{JSON_ONLY}

- If the expected state is reached: {{ "completed": true, "pass": true, "reason": "<describe evidence of success>" }}
- If the expected state is reached but incorrect: {{ "completed": true, "pass": false, "failure_type": "<ElementNotFound|NavigationTimeout|FocusError>", "reason": "<describe evidence of failure>" }}
- If the sequence is not complete: {{ "completed": false, "next_expected_state": "<welcome|sync|naming|inside_vault>" }}

Test case: {text}"#,
            text = goal.text
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vlm::ScriptedInference;
    use pretty_assertions::assert_eq;

    fn goal(text: &str) -> Goal {
        Goal::parse(text, "InternVault")
    }

    #[test]
    fn test_unparseable_reply_is_incomplete() {
        let verdict = Verdict::from_reply("The vault looks open to me!");
        assert!(!verdict.completed);
        assert!(verdict.reason.starts_with("unparseable verifier response: parse error: "));
    }

    #[test]
    fn test_missing_reason_is_empty() {
        let verdict = Verdict::from_reply(r#"{"completed":true,"pass":false}"#);
        assert_eq!(
            verdict,
            Verdict {
                completed: true,
                pass: false,
                failure_kind: None,
                reason: String::new(),
                next_expected_state: None,
            }
        );
    }

    #[test]
    fn test_failure_kind_and_fences() {
        let reply = "Sure:\n```json\n{\"completed\": true, \"pass\": false, \"failure_type\": \"ColorMismatch\", \"reason\": \"icon is grey\"}\n```";
        let verdict = Verdict::from_reply(reply);
        assert_eq!(verdict.failure_kind, Some(FailureKind::ColorMismatch));
        assert_eq!(verdict.reason, "icon is grey");

        let verdict = Verdict::from_reply(r#"{"completed": "true", "pass": "false", "failureKind": "element_not_found"}"#);
        assert_eq!(verdict.failure_kind, Some(FailureKind::ElementNotFound));
    }

    #[test]
    fn test_next_expected_state_becomes_reason() {
        let verdict = Verdict::from_reply(r#"{"completed": false, "next_expected_state": "sync"}"#);
        assert!(!verdict.pass);
        assert_eq!(verdict.reason, "next expected state: sync");
        assert_eq!(verdict.next_expected_state.as_deref(), Some("sync"));
    }

    #[test]
    fn test_pass_requires_completed() {
        let verdict = Verdict::from_reply(r#"{"pass": true}"#);
        assert!(!verdict.completed);
        assert!(!verdict.pass);
    }

    #[test]
    fn test_verify_uses_zero_temperature() {
        let vlm = ScriptedInference::new()
            .replies(PromptKind::Verify, [r#"{"completed": true, "pass": true, "reason": "vault open"}"#]);
        let verdict = Verifier::new(&vlm).verify(&goal("Create a vault named 'V'"), b"png");
        assert!(verdict.completed && verdict.pass);
        assert_eq!(vlm.temperatures_for(PromptKind::Verify), vec![0.0]);
    }

    #[test]
    fn test_inference_failure_is_incomplete() {
        let verdict = Verifier::new(&ScriptedInference::unavailable()).verify(&goal("anything"), b"png");
        assert!(!verdict.completed);
        assert!(verdict.reason.starts_with("verifier call failed: inference error: "));
    }

    #[test]
    fn test_prompts_follow_goal() {
        let colour = verification_prompt(&goal("Verify the Appearance tab icon is red"));
        assert!(colour.contains("ColorMismatch") && colour.contains("is red"));

        let menu = verification_prompt(&goal("Open a note, tap the menu and confirm 'Print to PDF' is visible"));
        assert!(menu.contains("ElementNotFound") && menu.contains("'Print to PDF'"));

        let note = verification_prompt(&goal("Create a note titled 'Meeting Notes' with body 'Daily Standup'"));
        assert!(note.contains("titled exactly 'Meeting Notes'") && note.contains("'Daily Standup'"));

        let vault = verification_prompt(&goal("Create a new vault named 'InternVault'"));
        assert!(vault.ends_with("Test case: Create a new vault named 'InternVault'"));
        for prompt in [colour, menu, note, vault] {
            assert_eq!(PromptKind::of(&prompt), Some(PromptKind::Verify));
        }
    }
}
