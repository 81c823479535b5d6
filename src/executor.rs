//! Action executor.
//!
//! Each action maps to at most one device call. `TapIndex` is resolved
//! against the index passed in with the action, which the run loop builds
//! from the same step's accessibility dump.

use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::action::Action;
use crate::device::{DeviceBridge, InputEvent};
use crate::elements::ElementIndex;

/// Named keys accepted by `Press`, with their Android key codes
pub const KEY_TABLE: [(&str, u32); 7] = [
    ("home", 3),
    ("back", 4),
    ("enter", 66),
    ("tab", 61),
    ("escape", 111),
    ("delete", 67),
    ("menu", 82),
];

/// Look up a key code by name, ignoring case
pub fn key_code(name: &str) -> Option<u32> {
    let name = name.trim();
    KEY_TABLE
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

/// Outcome of executing one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub success: bool,
    pub error: Option<String>,
}

impl Execution {
    fn ok() -> Self {
        Self { success: true, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

/// Translates actions into device input
pub struct Executor<'a> {
    device: &'a dyn DeviceBridge,
    honor_waits: bool,
}

impl<'a> Executor<'a> {
    pub fn new(device: &'a dyn DeviceBridge, honor_waits: bool) -> Self {
        Self { device, honor_waits }
    }

    /// Execute an action, reporting success
    pub fn execute(&self, action: &Action, elements: &ElementIndex) -> bool {
        self.run(action, elements).success
    }

    /// Execute an action, keeping the failure reason
    pub fn run(&self, action: &Action, elements: &ElementIndex) -> Execution {
        let event = match action {
            Action::Tap { x, y } => InputEvent::Tap { x: *x, y: *y },
            Action::TapIndex { index } => match elements.get(*index) {
                Some(element) => {
                    debug!(index, text = %element.text, "resolved element");
                    InputEvent::Tap { x: element.center.0, y: element.center.1 }
                }
                None => {
                    warn!(index, available = elements.len(), "element index out of range");
                    return Execution::failed(format!(
                        "index {} out of range ({} elements)",
                        index,
                        elements.len()
                    ));
                }
            },
            Action::Type { text } => InputEvent::Text(text.clone()),
            Action::Swipe { x1, y1, x2, y2, duration_ms } => InputEvent::Swipe {
                x1: *x1,
                y1: *y1,
                x2: *x2,
                y2: *y2,
                duration_ms: *duration_ms,
            },
            Action::Press { key } => match key_code(key) {
                Some(code) => InputEvent::KeyEvent(code),
                None => {
                    warn!(key = %key, "unknown key");
                    return Execution::failed(format!("unknown key: {}", key));
                }
            },
            Action::Wait { seconds } => {
                if self.honor_waits {
                    thread::sleep(Duration::from_secs(u64::from(*seconds)));
                }
                return Execution::ok();
            }
            Action::Done | Action::Failed => return Execution::ok(),
        };

        match self.device.inject(&event) {
            Ok(()) => Execution::ok(),
            Err(e) => {
                warn!(event = %event, error = %e, "input injection failed");
                Execution::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ScriptedDevice;
    use crate::device::scripted::ScriptedScreen;
    use crate::elements::build_index;
    use pretty_assertions::assert_eq;

    fn three_buttons() -> ElementIndex {
        let xml = crate::device::scripted::hierarchy_for_buttons(&["One", "Two", "Three"]);
        build_index(xml.as_bytes())
    }

    fn device() -> ScriptedDevice {
        ScriptedDevice::new(vec![ScriptedScreen::with_buttons("Home", &["One"])])
    }

    #[test]
    fn test_tap_index_resolves_center() {
        let device = device();
        let executor = Executor::new(&device, false);
        let index = three_buttons();

        assert!(executor.execute(&Action::tap_index(1), &index));
        assert!(executor.execute(&Action::tap_index(-1), &index));
        assert_eq!(
            device.injected(),
            vec![InputEvent::Tap { x: 180, y: 172 }, InputEvent::Tap { x: 180, y: 228 }]
        );
    }

    #[test]
    fn test_out_of_range_index_fails_without_input() {
        let device = device();
        let executor = Executor::new(&device, false);
        let index = three_buttons();

        assert!(!executor.execute(&Action::tap_index(3), &index));
        assert!(!executor.execute(&Action::tap_index(-2), &index));
        assert!(!executor.execute(&Action::tap_index(0), &ElementIndex::empty()));
        assert!(device.injected().is_empty());
    }

    #[test]
    fn test_press_uses_key_table() {
        let device = device();
        let executor = Executor::new(&device, false);

        assert!(executor.execute(&Action::press("Enter"), &ElementIndex::empty()));
        let unknown = executor.run(&Action::press("volume_up"), &ElementIndex::empty());
        assert!(!unknown.success);
        assert_eq!(unknown.error.as_deref(), Some("unknown key: volume_up"));
        assert_eq!(device.injected(), vec![InputEvent::KeyEvent(66)]);
    }

    #[test]
    fn test_wait_and_terminal_actions_touch_nothing() {
        let device = device();
        let executor = Executor::new(&device, false);
        for action in [Action::wait(5), Action::Done, Action::Failed] {
            assert!(executor.execute(&action, &ElementIndex::empty()));
        }
        assert!(device.injected().is_empty());
    }

    #[test]
    fn test_injection_failure_is_reported() {
        let device = device().fail_inject(true);
        let executor = Executor::new(&device, false);
        let result = executor.run(&Action::type_text("hello"), &ElementIndex::empty());
        assert!(!result.success);
        assert!(result.error.unwrap().contains("device rejected input"));
    }

    #[test]
    fn test_key_table_lookup() {
        assert_eq!(key_code("home"), Some(3));
        assert_eq!(key_code(" BACK "), Some(4));
        assert_eq!(key_code("escape"), Some(111));
        assert_eq!(key_code("power"), None);
    }
}
