//! In-memory device driven by a script of screens.
//!
//! Each screen pairs a rendered title/buttons frame with an accessibility
//! dump. The device advances to the next screen after every successful input
//! event and stays on the last one once the script runs out. All calls are
//! recorded so tests can assert on exactly what the agent did.

use std::sync::Mutex;

use super::{DeviceBridge, DeviceError, DeviceResult, InputEvent, MockFramebuffer};

/// Default listing for a single healthy emulator
pub const ONE_EMULATOR: &str = "List of devices attached\nemulator-5554\tdevice\n";

/// One scripted screen
#[derive(Debug, Clone)]
pub struct ScriptedScreen {
    pub title: String,
    pub buttons: Vec<String>,
    /// Accessibility dump returned while this screen is showing
    pub hierarchy: String,
}

impl ScriptedScreen {
    /// Screen whose hierarchy exposes each button as a clickable node,
    /// stacked vertically in the same layout `MockFramebuffer::phone_screen`
    /// draws for a 360px-wide display.
    pub fn with_buttons(title: &str, buttons: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            buttons: buttons.iter().map(|b| b.to_string()).collect(),
            hierarchy: hierarchy_for_buttons(buttons),
        }
    }
}

/// Build a uiautomator-style dump with one clickable node per button
pub fn hierarchy_for_buttons(buttons: &[&str]) -> String {
    let mut xml = String::from(
        "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation=\"0\">\n",
    );
    for (i, label) in buttons.iter().enumerate() {
        let top = 96 + i as i32 * 56;
        xml.push_str(&format!(
            "  <node index=\"{}\" text=\"{}\" resource-id=\"\" class=\"android.widget.Button\" content-desc=\"\" clickable=\"true\" long-clickable=\"false\" bounds=\"[16,{}][344,{}]\" />\n",
            i,
            label,
            top,
            top + 40
        ));
    }
    xml.push_str("</hierarchy>");
    xml
}

#[derive(Debug, Default)]
struct State {
    cursor: usize,
    running: bool,
    injected: Vec<InputEvent>,
    launches: Vec<String>,
    captures: usize,
}

/// Scripted stand-in for a phone
#[derive(Debug)]
pub struct ScriptedDevice {
    width: u32,
    height: u32,
    device_list: String,
    screens: Vec<ScriptedScreen>,
    launch_succeeds: bool,
    fail_capture: bool,
    fail_inject: bool,
    state: Mutex<State>,
}

impl ScriptedDevice {
    /// A 360x800 device with one emulator attached and the app not running
    pub fn new(screens: Vec<ScriptedScreen>) -> Self {
        Self {
            width: 360,
            height: 800,
            device_list: ONE_EMULATOR.to_string(),
            screens,
            launch_succeeds: true,
            fail_capture: false,
            fail_inject: false,
            state: Mutex::new(State::default()),
        }
    }

    pub fn device_list(mut self, listing: &str) -> Self {
        self.device_list = listing.to_string();
        self
    }

    pub fn app_running(self, running: bool) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.running = running;
        }
        self
    }

    pub fn launch_succeeds(mut self, ok: bool) -> Self {
        self.launch_succeeds = ok;
        self
    }

    pub fn fail_capture(mut self, fail: bool) -> Self {
        self.fail_capture = fail;
        self
    }

    pub fn fail_inject(mut self, fail: bool) -> Self {
        self.fail_inject = fail;
        self
    }

    pub fn injected(&self) -> Vec<InputEvent> {
        self.with_state(|s| s.injected.clone())
    }

    pub fn launches(&self) -> Vec<String> {
        self.with_state(|s| s.launches.clone())
    }

    pub fn capture_count(&self) -> usize {
        self.with_state(|s| s.captures)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn current(&self, cursor: usize) -> Option<&ScriptedScreen> {
        self.screens
            .get(cursor)
            .or_else(|| self.screens.last())
    }
}

impl DeviceBridge for ScriptedDevice {
    fn list_devices(&self) -> DeviceResult<String> {
        Ok(self.device_list.clone())
    }

    fn capture(&self) -> DeviceResult<Vec<u8>> {
        if self.fail_capture {
            return Err(DeviceError::Timeout {
                command: "screencap".to_string(),
                timeout: std::time::Duration::from_secs(30),
            });
        }
        let cursor = self.with_state(|s| {
            s.captures += 1;
            s.cursor
        });
        let (title, buttons) = match self.current(cursor) {
            Some(screen) => (screen.title.clone(), screen.buttons.clone()),
            None => ("blank".to_string(), Vec::new()),
        };
        let labels: Vec<&str> = buttons.iter().map(String::as_str).collect();
        MockFramebuffer::phone_screen(self.width, self.height, &title, &labels).to_png()
    }

    fn pull_accessibility_snapshot(&self) -> DeviceResult<String> {
        let cursor = self.with_state(|s| s.cursor);
        Ok(self
            .current(cursor)
            .map(|screen| screen.hierarchy.clone())
            .unwrap_or_default())
    }

    fn inject(&self, event: &InputEvent) -> DeviceResult<()> {
        if self.fail_inject {
            return Err(DeviceError::CommandFailed {
                command: format!("input {}", event),
                stderr: "device rejected input".to_string(),
            });
        }
        self.with_state(|s| {
            s.injected.push(event.clone());
            s.cursor += 1;
        });
        Ok(())
    }

    fn is_process_running(&self, _package: &str) -> DeviceResult<bool> {
        Ok(self.with_state(|s| s.running))
    }

    fn launch(&self, package: &str) -> DeviceResult<bool> {
        let ok = self.launch_succeeds;
        self.with_state(|s| {
            s.launches.push(package.to_string());
            if ok {
                s.running = true;
            }
        });
        Ok(ok)
    }
}
