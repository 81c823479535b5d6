//! adb-backed device bridge.
//!
//! Every call spawns one `adb` process. Output is drained on a reader thread
//! while the caller polls for exit, so a wedged device surfaces as
//! `DeviceError::Timeout` instead of blocking the run loop forever.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{DeviceBridge, DeviceError, DeviceResult, InputEvent};
use crate::config::DeviceSettings;

/// Location the hierarchy dump is written to on the device
const DEVICE_DUMP_PATH: &str = "/sdcard/window_dump.xml";

/// Bridge to a device through the `adb` executable
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb_path: String,
    serial: Option<String>,
    timeout: Duration,
}

/// Captured output of a finished adb command
struct CommandOutput {
    success: bool,
    stdout: Vec<u8>,
    stderr: String,
}

impl AdbBridge {
    pub fn new(settings: &DeviceSettings) -> Self {
        Self {
            adb_path: settings.adb_path.clone(),
            serial: settings.serial.clone(),
            timeout: Duration::from_secs(settings.command_timeout),
        }
    }

    /// Run adb with the given arguments, prefixed with `-s <serial>` when set
    fn run(&self, args: &[&str]) -> DeviceResult<CommandOutput> {
        let mut full_args: Vec<&str> = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            full_args.push("-s");
            full_args.push(serial);
        }
        full_args.extend_from_slice(args);
        let command_line = format!("adb {}", full_args.join(" "));
        debug!(command = %command_line, "running adb");

        let mut child = Command::new(&self.adb_path)
            .args(&full_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DeviceError::AdbNotFound(format!("{} is not on PATH", self.adb_path))
                }
                _ => DeviceError::Io(e),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeviceError::Io(std::io::Error::other("Failed to capture stdout")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DeviceError::Io(std::io::Error::other("Failed to capture stderr")))?;

        let stdout_rx = spawn_drain(stdout);
        let stderr_rx = spawn_drain(stderr);

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DeviceError::Timeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
            thread::sleep(Duration::from_millis(20));
        };

        let stdout = stdout_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or_default();
        let stderr = stderr_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or_default();

        Ok(CommandOutput {
            success: status.success(),
            stdout,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        })
    }

    /// Run adb and require a zero exit status
    fn run_checked(&self, args: &[&str]) -> DeviceResult<Vec<u8>> {
        let output = self.run(args)?;
        if output.success {
            Ok(output.stdout)
        } else {
            let stderr = if output.stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                output.stderr
            };
            Err(DeviceError::CommandFailed {
                command: format!("adb {}", args.join(" ")),
                stderr,
            })
        }
    }

    fn shell(&self, args: &[&str]) -> DeviceResult<String> {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        let out = self.run_checked(&full)?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }
}

/// Read a pipe to completion on a background thread
fn spawn_drain<R: Read + Send + 'static>(mut reader: R) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        let _ = tx.send(buffer);
    });
    rx
}

/// Escape text for `adb shell input text`.
///
/// Spaces become `%s`; shell metacharacters and glob characters are
/// backslash-escaped.
pub fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        match ch {
            ' ' => out.push_str("%s"),
            '\\' | '&' | '\'' | '"' | ';' | '(' | ')' | '<' | '>' | '|' | '$' | '`' | '%' | '*' | '?'
            | '#' | '~' | '!' | '{' | '}' | '[' | ']' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Split text into escaped `input text` arguments.
///
/// `input text` turns every `%s` into a space, so a literal `%` followed by
/// `s` is sent across two commands.
pub fn input_text_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut after_percent = false;
    for ch in text.chars() {
        if after_percent && ch == 's' {
            chunks.push(escape_input_text(&std::mem::take(&mut current)));
        }
        current.push(ch);
        after_percent = ch == '%';
    }
    if !current.is_empty() {
        chunks.push(escape_input_text(&current));
    }
    chunks
}

impl DeviceBridge for AdbBridge {
    fn list_devices(&self) -> DeviceResult<String> {
        // Listing must not be scoped to a serial
        let out = Self {
            serial: None,
            ..self.clone()
        }
        .run_checked(&["devices"])?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }

    fn capture(&self) -> DeviceResult<Vec<u8>> {
        let png = self.run_checked(&["exec-out", "screencap", "-p"])?;
        if png.is_empty() {
            return Err(DeviceError::CommandFailed {
                command: "adb exec-out screencap -p".to_string(),
                stderr: "empty screenshot".to_string(),
            });
        }
        Ok(png)
    }

    fn pull_accessibility_snapshot(&self) -> DeviceResult<String> {
        self.shell(&["uiautomator", "dump", DEVICE_DUMP_PATH])?;
        let xml = self.run_checked(&["exec-out", "cat", DEVICE_DUMP_PATH])?;
        Ok(String::from_utf8_lossy(&xml).to_string())
    }

    fn inject(&self, event: &InputEvent) -> DeviceResult<()> {
        match event {
            InputEvent::Tap { x, y } => {
                self.shell(&["input", "tap", &x.to_string(), &y.to_string()])?;
            }
            InputEvent::Swipe { x1, y1, x2, y2, duration_ms } => {
                self.shell(&[
                    "input",
                    "swipe",
                    &x1.to_string(),
                    &y1.to_string(),
                    &x2.to_string(),
                    &y2.to_string(),
                    &duration_ms.to_string(),
                ])?;
            }
            InputEvent::Text(text) => {
                for chunk in input_text_chunks(text) {
                    self.shell(&["input", "text", &chunk])?;
                }
            }
            InputEvent::KeyEvent(code) => {
                self.shell(&["input", "keyevent", &code.to_string()])?;
            }
        }
        Ok(())
    }

    fn is_process_running(&self, package: &str) -> DeviceResult<bool> {
        // pidof exits non-zero when nothing matches
        let output = self.run(&["shell", "pidof", package])?;
        Ok(output.success && !String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn launch(&self, package: &str) -> DeviceResult<bool> {
        let launched = self.run(&[
            "shell",
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])?;
        if launched.success {
            return Ok(true);
        }
        warn!(package, stderr = %launched.stderr, "monkey launch failed, checking process");
        self.is_process_running(package)
    }
}
