//! Configuration management with environment variable support.
//!
//! Configuration is assembled once (usually in `main`) and handed to the
//! orchestrator explicitly. Nothing in the library reads the environment on
//! its own.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DROID_VISION_VLM_ENDPOINT` | Inference API endpoint URL | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `DROID_VISION_VLM_MODEL` | Model name | `gemini-2.0-flash` |
//! | `DROID_VISION_VLM_API_KEY` | Bearer token (falls back to `GEMINI_API_KEY`) | unset |
//! | `DROID_VISION_VLM_MAX_TOKENS` | Maximum tokens in a response | `1024` |
//! | `DROID_VISION_VLM_TIMEOUT` | Request timeout in seconds | `60` |
//! | `DROID_VISION_ADB` | adb executable | `adb` |
//! | `DROID_VISION_SERIAL` | Target device serial | unset |
//! | `DROID_VISION_PACKAGE` | Application package under test | `md.obsidian` |
//! | `DROID_VISION_ADB_TIMEOUT` | Per-command adb timeout in seconds | `30` |
//! | `DROID_VISION_MAX_STEPS` | Step budget per run | `20` |
//! | `DROID_VISION_ARTIFACTS_DIR` | Base directory for run artifacts | `artifacts` |
//! | `DROID_VISION_STEP_DELAY_MS` | Settle delay after each action | `3000` |
//! | `DROID_VISION_LAUNCH_SETTLE_MS` | Settle delay after launching the app | `10000` |
//! | `DROID_VISION_FREE_PLANNER` | Ask the model for actions on unrecognised goals | `false` |
//! | `DROID_VISION_PROFILE` | Path to a device profile JSON file | built-in `pixel_9_pro` |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::harness::types::{HarnessError, HarnessResult};
use crate::planner::Target;

// ============================================================================
// Default Values
// ============================================================================

/// Default inference API endpoint
pub const DEFAULT_VLM_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default inference model name
pub const DEFAULT_VLM_MODEL: &str = "gemini-2.0-flash";

/// Default max tokens for inference responses
pub const DEFAULT_VLM_MAX_TOKENS: u32 = 1024;

/// Default inference request timeout (seconds)
pub const DEFAULT_VLM_TIMEOUT: u64 = 60;

/// Default adb executable
pub const DEFAULT_ADB_PATH: &str = "adb";

/// Default application package under test
pub const DEFAULT_PACKAGE: &str = "md.obsidian";

/// Default adb command timeout (seconds)
pub const DEFAULT_ADB_TIMEOUT: u64 = 30;

/// Default step budget per run
pub const DEFAULT_MAX_STEPS: u32 = 20;

/// Default artifact base directory
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Default delay after each action (milliseconds)
pub const DEFAULT_STEP_DELAY_MS: u64 = 3000;

/// Default delay after launching the application (milliseconds)
pub const DEFAULT_LAUNCH_SETTLE_MS: u64 = 10_000;

/// Default number of structured coordinate queries per target
pub const DEFAULT_STRUCTURED_ATTEMPTS: u32 = 4;

/// Default number of offset probes per target
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 3;

/// Default number of scroll gestures while searching a list
pub const DEFAULT_MAX_SCROLLS: u32 = 3;

/// Longest wait the model may ask for (seconds)
pub const DEFAULT_MAX_WAIT_SECS: u32 = 10;

/// Vault name used when a goal needs a vault but does not name one
pub const DEFAULT_VAULT_NAME: &str = "InternVault";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_VLM_ENDPOINT: &str = "DROID_VISION_VLM_ENDPOINT";
pub const ENV_VLM_MODEL: &str = "DROID_VISION_VLM_MODEL";
pub const ENV_VLM_API_KEY: &str = "DROID_VISION_VLM_API_KEY";
pub const ENV_VLM_MAX_TOKENS: &str = "DROID_VISION_VLM_MAX_TOKENS";
pub const ENV_VLM_TIMEOUT: &str = "DROID_VISION_VLM_TIMEOUT";
pub const ENV_ADB_PATH: &str = "DROID_VISION_ADB";
pub const ENV_SERIAL: &str = "DROID_VISION_SERIAL";
pub const ENV_PACKAGE: &str = "DROID_VISION_PACKAGE";
pub const ENV_ADB_TIMEOUT: &str = "DROID_VISION_ADB_TIMEOUT";
pub const ENV_MAX_STEPS: &str = "DROID_VISION_MAX_STEPS";
pub const ENV_ARTIFACTS_DIR: &str = "DROID_VISION_ARTIFACTS_DIR";
pub const ENV_STEP_DELAY_MS: &str = "DROID_VISION_STEP_DELAY_MS";
pub const ENV_LAUNCH_SETTLE_MS: &str = "DROID_VISION_LAUNCH_SETTLE_MS";
pub const ENV_FREE_PLANNER: &str = "DROID_VISION_FREE_PLANNER";
pub const ENV_PROFILE: &str = "DROID_VISION_PROFILE";

/// Legacy credential variable
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

// ============================================================================
// Configuration
// ============================================================================

/// Complete configuration for a test session
#[derive(Debug, Clone)]
pub struct Config {
    /// Inference service settings
    pub vlm: VlmSettings,
    /// Device bridge settings
    pub device: DeviceSettings,
    /// Run loop settings
    pub run: RunSettings,
    /// Planner limits
    pub planner: PlannerSettings,
    /// Device-specific fallback coordinates
    pub profile: DeviceProfile,
}

/// Inference service settings
#[derive(Debug, Clone)]
pub struct VlmSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    /// Request timeout (seconds)
    pub timeout: u64,
}

/// Device bridge settings
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub adb_path: String,
    pub serial: Option<String>,
    /// Package id of the application under test
    pub package: String,
    /// Per-command timeout (seconds)
    pub command_timeout: u64,
}

/// Run loop settings
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_steps: u32,
    pub artifacts_dir: PathBuf,
    pub timing: Timing,
    /// Consult the model for actions when a goal matches no known flow
    pub free_planner: bool,
}

/// Planner retry limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerSettings {
    pub structured_attempts: u32,
    pub probe_attempts: u32,
    pub max_scrolls: u32,
    /// Upper bound on a model-requested `wait`
    pub max_wait_secs: u32,
    pub default_vault_name: String,
}

/// Delays applied by the run loop and executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause after each executed action so the UI can settle
    pub step_delay: Duration,
    /// Pause after launching the application
    pub launch_settle: Duration,
    /// Whether `Wait` actions actually sleep
    pub honor_waits: bool,
}

impl Timing {
    /// No delays at all. Used by tests and the offline demo.
    pub fn instant() -> Self {
        Self {
            step_delay: Duration::ZERO,
            launch_settle: Duration::ZERO,
            honor_waits: false,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(DEFAULT_STEP_DELAY_MS),
            launch_settle: Duration::from_millis(DEFAULT_LAUNCH_SETTLE_MS),
            honor_waits: true,
        }
    }
}

/// Device-specific constants: screen size, approximate anchors for targets
/// that the accessibility tree does not expose, and the probe offsets tried
/// around each anchor.
///
/// Anchors only hold for the resolution they were measured on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub anchors: BTreeMap<Target, (i32, i32)>,
    #[serde(default = "default_probe_offsets")]
    pub probe_offsets: Vec<(i32, i32)>,
}

fn default_probe_offsets() -> Vec<(i32, i32)> {
    vec![(0, 0), (0, -60), (0, 60)]
}

impl DeviceProfile {
    /// Built-in profile for a Pixel 9 Pro emulator (1280x2856)
    pub fn pixel_9_pro() -> Self {
        let anchors = BTreeMap::from([
            (Target::CreateVaultButton, (640, 1750)),
            (Target::ContinueWithoutSync, (640, 2050)),
            (Target::VaultNameField, (640, 820)),
            (Target::UseThisFolder, (1090, 2660)),
            (Target::AllowAccess, (640, 1560)),
            (Target::NewNoteButton, (1180, 2700)),
            (Target::NoteTitleField, (400, 420)),
            (Target::SettingsButton, (1180, 210)),
            (Target::AppearanceTab, (400, 1320)),
            (Target::OverflowMenu, (1210, 210)),
            (Target::FirstNote, (400, 560)),
        ]);
        Self {
            name: "pixel_9_pro".to_string(),
            width: 1280,
            height: 2856,
            anchors,
            probe_offsets: default_probe_offsets(),
        }
    }

    /// Profile without any anchors; coordinate refinement stops after the
    /// structured queries.
    pub fn bare(width: u32, height: u32) -> Self {
        Self {
            name: format!("bare_{}x{}", width, height),
            width,
            height,
            anchors: BTreeMap::new(),
            probe_offsets: default_probe_offsets(),
        }
    }

    /// Load a profile from a JSON file
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            HarnessError::Config(format!("invalid device profile {}: {}", path.display(), e))
        })
    }

    pub fn anchor(&self, target: Target) -> Option<(i32, i32)> {
        self.anchors.get(&target).copied()
    }
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> HarnessResult<Self> {
        let profile = match env::var(ENV_PROFILE) {
            Ok(path) if !path.trim().is_empty() => DeviceProfile::load(Path::new(path.trim()))?,
            _ => DeviceProfile::pixel_9_pro(),
        };
        Ok(Self {
            vlm: VlmSettings::from_env(),
            device: DeviceSettings::from_env(),
            run: RunSettings::from_env(),
            planner: PlannerSettings::defaults(),
            profile,
        })
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            vlm: VlmSettings::defaults(),
            device: DeviceSettings::defaults(),
            run: RunSettings::defaults(),
            planner: PlannerSettings::defaults(),
            profile: DeviceProfile::pixel_9_pro(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.run.max_steps = max_steps;
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run.artifacts_dir = dir.into();
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.run.timing = timing;
        self
    }

    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }
}

impl VlmSettings {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_VLM_ENDPOINT)
                .unwrap_or_else(|_| DEFAULT_VLM_ENDPOINT.to_string()),
            model: env::var(ENV_VLM_MODEL).unwrap_or_else(|_| DEFAULT_VLM_MODEL.to_string()),
            api_key: env::var(ENV_VLM_API_KEY)
                .or_else(|_| env::var(ENV_GEMINI_API_KEY))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            max_tokens: parse_env(ENV_VLM_MAX_TOKENS).unwrap_or(DEFAULT_VLM_MAX_TOKENS),
            timeout: parse_env(ENV_VLM_TIMEOUT).unwrap_or(DEFAULT_VLM_TIMEOUT),
        }
    }

    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_VLM_ENDPOINT.to_string(),
            model: DEFAULT_VLM_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_VLM_MAX_TOKENS,
            timeout: DEFAULT_VLM_TIMEOUT,
        }
    }
}

impl DeviceSettings {
    pub fn from_env() -> Self {
        Self {
            adb_path: env::var(ENV_ADB_PATH).unwrap_or_else(|_| DEFAULT_ADB_PATH.to_string()),
            serial: env::var(ENV_SERIAL).ok().filter(|s| !s.trim().is_empty()),
            package: env::var(ENV_PACKAGE).unwrap_or_else(|_| DEFAULT_PACKAGE.to_string()),
            command_timeout: parse_env(ENV_ADB_TIMEOUT).unwrap_or(DEFAULT_ADB_TIMEOUT),
        }
    }

    pub fn defaults() -> Self {
        Self {
            adb_path: DEFAULT_ADB_PATH.to_string(),
            serial: None,
            package: DEFAULT_PACKAGE.to_string(),
            command_timeout: DEFAULT_ADB_TIMEOUT,
        }
    }
}

impl RunSettings {
    pub fn from_env() -> Self {
        let timing = Timing {
            step_delay: Duration::from_millis(
                parse_env(ENV_STEP_DELAY_MS).unwrap_or(DEFAULT_STEP_DELAY_MS),
            ),
            launch_settle: Duration::from_millis(
                parse_env(ENV_LAUNCH_SETTLE_MS).unwrap_or(DEFAULT_LAUNCH_SETTLE_MS),
            ),
            honor_waits: true,
        };
        Self {
            max_steps: parse_env(ENV_MAX_STEPS).unwrap_or(DEFAULT_MAX_STEPS),
            artifacts_dir: env::var(ENV_ARTIFACTS_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_ARTIFACTS_DIR)),
            timing,
            free_planner: env::var(ENV_FREE_PLANNER)
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }

    pub fn defaults() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            timing: Timing::default(),
            free_planner: false,
        }
    }
}

impl PlannerSettings {
    pub fn defaults() -> Self {
        Self {
            structured_attempts: DEFAULT_STRUCTURED_ATTEMPTS,
            probe_attempts: DEFAULT_PROBE_ATTEMPTS,
            max_scrolls: DEFAULT_MAX_SCROLLS,
            max_wait_secs: DEFAULT_MAX_WAIT_SECS,
            default_vault_name: DEFAULT_VAULT_NAME.to_string(),
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Interpret "1", "true", "yes", "on" (any case) as enabled
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
