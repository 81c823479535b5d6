//! Offline vault-creation scenario.
//!
//! A scripted device walks through Obsidian's first-run screens while a
//! scripted model labels each frame and only confirms the goal once the
//! vault is open. Used by `droid-vision demo`.

use crate::device::ScriptedDevice;
use crate::device::scripted::ScriptedScreen;
use crate::harness::TestCase;
use crate::vlm::{PromptKind, ScriptedInference};

pub const DEMO_TEST_ID: &str = "demo";

pub fn demo_test() -> TestCase {
    TestCase::new(DEMO_TEST_ID, "Create a new vault named 'InternVault' and open it")
}

/// Device and model scripted for `demo_test`
pub fn vault_scenario() -> (ScriptedDevice, ScriptedInference) {
    let naming = ScriptedScreen::with_buttons("New vault", &["Vault name", "Create a vault"]);
    let device = ScriptedDevice::new(vec![
        ScriptedScreen::with_buttons("Welcome", &["Create a vault"]),
        ScriptedScreen::with_buttons("Sync", &["Continue without sync"]),
        naming.clone(),
        naming.clone(),
        naming,
        ScriptedScreen::with_buttons("Select folder", &["Use this folder"]),
        ScriptedScreen::with_buttons("Permission", &["Allow"]),
        ScriptedScreen::with_buttons("InternVault", &["Create new note", "Settings"]),
    ]);

    let pending = |next: &str| format!(r#"{{"completed": false, "next_expected_state": "{}"}}"#, next);
    let vlm = ScriptedInference::new()
        .replies(
            PromptKind::Classify,
            [
                "welcome",
                "sync",
                "config",
                "config",
                "config",
                "folder_select",
                "permission",
                "file_browser",
            ],
        )
        .replies(
            PromptKind::Verify,
            [
                pending("sync"),
                pending("naming"),
                pending("naming"),
                pending("naming"),
                pending("inside_vault"),
                pending("inside_vault"),
                pending("inside_vault"),
                r#"{"completed": true, "pass": true, "reason": "vault 'InternVault' is open in the file explorer"}"#
                    .to_string(),
            ],
        );
    (device, vlm)
}
