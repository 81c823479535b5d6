//! Device-control bridge abstraction.
//!
//! The agent only needs a handful of capabilities from a phone or emulator:
//! list attached devices, capture the screen, dump the accessibility tree,
//! inject input, and check/launch the application under test.
//!
//! - `AdbBridge` drives a real device through the `adb` executable
//! - `ScriptedDevice` is an in-memory device for tests and the offline demo

pub mod adb;
pub mod framebuffer;
pub mod scripted;

pub use adb::{AdbBridge, escape_input_text};
pub use framebuffer::MockFramebuffer;
pub use scripted::ScriptedDevice;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Transport-level failures talking to the device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The adb executable could not be started
    #[error("adb not found: {0}")]
    AdbNotFound(String),

    /// A device command ran but reported failure
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// A device command did not finish in time
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One input event injected into the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Tap { x: i32, y: i32 },
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32 },
    Text(String),
    KeyEvent(u32),
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::Tap { x, y } => write!(f, "tap ({}, {})", x, y),
            InputEvent::Swipe { x1, y1, x2, y2, duration_ms } => write!(
                f,
                "swipe ({}, {}) -> ({}, {}) over {}ms",
                x1, y1, x2, y2, duration_ms
            ),
            InputEvent::Text(text) => write!(f, "text {:?}", text),
            InputEvent::KeyEvent(code) => write!(f, "keyevent {}", code),
        }
    }
}

/// Capabilities the run loop consumes from a device.
///
/// Every call is blocking and fallible. Callers convert failures into a
/// failed step, never into an aborted run.
pub trait DeviceBridge: Send + Sync {
    /// Raw output of the device listing (`adb devices`)
    fn list_devices(&self) -> DeviceResult<String>;

    /// Capture the current screen as PNG bytes
    fn capture(&self) -> DeviceResult<Vec<u8>>;

    /// Dump the current accessibility hierarchy as XML text
    fn pull_accessibility_snapshot(&self) -> DeviceResult<String>;

    /// Inject one input event
    fn inject(&self, event: &InputEvent) -> DeviceResult<()>;

    /// Whether the given package currently has a running process
    fn is_process_running(&self, package: &str) -> DeviceResult<bool>;

    /// Launch the given package; `Ok(false)` when the device refused
    fn launch(&self, package: &str) -> DeviceResult<bool>;
}

/// Parsed state of the device listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Nothing attached
    NoDevice,
    /// Devices attached but none usable (offline or unauthorized)
    Offline(Vec<String>),
    /// At least one usable device; serials in listing order
    Present(Vec<String>),
}

impl DeviceStatus {
    pub fn is_present(&self) -> bool {
        matches!(self, DeviceStatus::Present(_))
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::NoDevice => write!(f, "no device connected"),
            DeviceStatus::Offline(serials) => write!(f, "device offline: {}", serials.join(", ")),
            DeviceStatus::Present(serials) => write!(f, "device present: {}", serials.join(", ")),
        }
    }
}

/// Parse `adb devices` output.
///
/// The `List of devices attached` header and daemon chatter (`* daemon ...`)
/// are ignored; each remaining line is `<serial>\t<state>`.
pub fn parse_device_list(output: &str) -> DeviceStatus {
    let mut present = Vec::new();
    let mut unusable = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('*') || line.to_lowercase().starts_with("list of devices") {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(serial), Some(state)) = (parts.next(), parts.next()) else {
            continue;
        };
        if state == "device" {
            present.push(serial.to_string());
        } else {
            unusable.push(serial.to_string());
        }
    }

    if !present.is_empty() {
        DeviceStatus::Present(present)
    } else if !unusable.is_empty() {
        DeviceStatus::Offline(unusable)
    } else {
        DeviceStatus::NoDevice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_header_only_means_no_device() {
        assert_eq!(parse_device_list("List of devices attached\n\n"), DeviceStatus::NoDevice);
        assert_eq!(parse_device_list(""), DeviceStatus::NoDevice);
    }

    #[test]
    fn test_present_device() {
        let out = "List of devices attached\nemulator-5554\tdevice\n";
        assert_eq!(
            parse_device_list(out),
            DeviceStatus::Present(vec!["emulator-5554".to_string()])
        );
    }

    #[test]
    fn test_offline_and_unauthorized() {
        let out = "List of devices attached\nemulator-5554\toffline\nR58M\tunauthorized\n";
        assert_eq!(
            parse_device_list(out),
            DeviceStatus::Offline(vec!["emulator-5554".to_string(), "R58M".to_string()])
        );
    }

    #[test]
    fn test_daemon_chatter_ignored() {
        let out = "* daemon not running; starting now at tcp:5037\n* daemon started successfully\nList of devices attached\nemulator-5556\tdevice\n";
        assert!(parse_device_list(out).is_present());
    }

    #[test]
    fn test_one_usable_device_wins_over_offline() {
        let out = "List of devices attached\nA\toffline\nB\tdevice\n";
        assert_eq!(parse_device_list(out), DeviceStatus::Present(vec!["B".to_string()]));
    }
}
