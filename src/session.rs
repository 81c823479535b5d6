//! Per-run artifact directories.
//!
//! Each run writes into `<artifacts>/<test id>/`:
//! - `.session.json` with run metadata
//! - `step_01.png`, `step_02.png`, ... one screenshot per step
//! - `final.png` when a planner `Done` is double-checked
//! - `result.json` with the `RunResult`
//!
//! A suite additionally writes `<artifacts>/summary.json`. Artifacts are for
//! auditing only: write failures are logged and never fail a run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::runner::{RunResult, SuiteSummary};

/// Artifact directory of one run
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Root directory for this run
    pub dir: PathBuf,
}

impl Session {
    /// Session for one test under the artifacts base directory
    pub fn for_test(base: &Path, test_id: &str) -> Self {
        let name = sanitize_name(test_id);
        Self {
            id: format!("{}_{}", name, generate_timestamp_suffix()),
            dir: base.join(name),
        }
    }

    /// Create the directory and write `.session.json`
    pub fn init(&self, goal: &str, package: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let metadata = serde_json::json!({
            "id": self.id,
            "goal": goal,
            "package": package,
            "host": host,
            "created": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_path = self.dir.join(".session.json");
        fs::write(metadata_path, serde_json::to_string_pretty(&metadata)?)?;
        Ok(())
    }

    /// Path of a step screenshot, numbered from 1 and zero-padded
    pub fn step_path(&self, step: u32) -> PathBuf {
        self.dir.join(format!("step_{:02}.png", step))
    }

    /// Write a step screenshot; `None` (and a warning) if it could not be written
    pub fn write_screenshot(&self, step: u32, png: &[u8]) -> Option<PathBuf> {
        self.write_capture(self.step_path(step), png)
    }

    /// Write the frame used to double-check a planner `Done`
    pub fn write_final(&self, png: &[u8]) -> Option<PathBuf> {
        self.write_capture(self.dir.join("final.png"), png)
    }

    fn write_capture(&self, path: PathBuf, png: &[u8]) -> Option<PathBuf> {
        match fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, png)) {
            Ok(()) => {
                debug!(path = %path.display(), bytes = png.len(), "screenshot saved");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not write screenshot");
                None
            }
        }
    }

    /// Write `result.json`, warning on failure
    pub fn write_result(&self, result: &RunResult) {
        let path = self.dir.join("result.json");
        if let Err(e) = write_json(&path, result) {
            warn!(path = %path.display(), error = %e, "could not write run result");
        }
    }

    /// List all PNG files in the session
    pub fn list_captures(&self) -> io::Result<Vec<PathBuf>> {
        let mut captures = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().map(|e| e == "png").unwrap_or(false) {
                    captures.push(path);
                }
            }
        }
        captures.sort();
        Ok(captures)
    }
}

/// Write `summary.json` under the artifacts base directory
pub fn write_summary(base: &Path, summary: &SuiteSummary) -> io::Result<PathBuf> {
    fs::create_dir_all(base)?;
    let path = base.join("summary.json");
    write_json(&path, summary)?;
    Ok(path)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)
}

/// Generate a timestamp suffix
fn generate_timestamp_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in filenames
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() { "run".to_string() } else { cleaned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Outcome;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("T1"), "T1");
        assert_eq!(sanitize_name("vault test/1"), "vault_test_1");
        assert_eq!(sanitize_name("  "), "run");
    }

    #[test]
    fn test_step_path_is_zero_padded() {
        let session = Session::for_test(Path::new("/tmp/artifacts"), "T1");
        assert!(session.step_path(1).ends_with("T1/step_01.png"));
        assert!(session.step_path(12).ends_with("T1/step_12.png"));
        assert!(session.id.starts_with("T1_"));
    }

    #[test]
    fn test_init_writes_metadata() {
        let tmp = TempDir::new().unwrap();
        let session = Session::for_test(tmp.path(), "T2");
        session.init("Create a note", "md.obsidian").unwrap();

        let raw = fs::read_to_string(session.dir.join(".session.json")).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta["goal"], "Create a note");
        assert_eq!(meta["package"], "md.obsidian");
        assert!(meta["host"].is_string());
    }

    #[test]
    fn test_screenshots_and_result() {
        let tmp = TempDir::new().unwrap();
        let session = Session::for_test(tmp.path(), "T3");

        assert!(session.write_screenshot(2, b"png").is_some());
        assert!(session.write_screenshot(1, b"png").is_some());
        let captures = session.list_captures().unwrap();
        assert_eq!(captures, vec![session.step_path(1), session.step_path(2)]);

        let now = chrono::Utc::now();
        session.write_result(&RunResult {
            test_id: "T3".to_string(),
            goal: "g".to_string(),
            outcome: Outcome::Pass,
            reason: "ok".to_string(),
            steps_taken: 2,
            artifacts_path: session.dir.clone(),
            history: Vec::new(),
            started_at: now,
            finished_at: now,
        });
        let raw = fs::read_to_string(session.dir.join("result.json")).unwrap();
        assert!(raw.contains("\"outcome\": \"PASS\""));
    }

    #[test]
    fn test_unwritable_directory_only_warns() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // The session directory would have to live inside a regular file
        let session = Session::for_test(&blocker, "T4");
        assert!(session.write_screenshot(1, b"png").is_none());
    }
}
