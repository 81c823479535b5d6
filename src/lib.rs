//! Droid Vision - closed-loop Android UI testing with vision model guidance.
//!
//! This crate provides:
//! - An adb-backed device bridge and a scripted in-memory device
//! - An OpenAI-compatible inference client and a scripted model
//! - Element indexing of uiautomator accessibility dumps
//! - Screen classification, goal planning and verification
//! - A bounded run loop that turns a natural-language goal into a PASS/FAIL result
//!
//! # Example
//!
//! ```rust,no_run
//! use droid_vision::config::Config;
//! use droid_vision::device::AdbBridge;
//! use droid_vision::harness::{Orchestrator, TestCase};
//! use droid_vision::vlm::VlmClient;
//!
//! let config = Config::from_env().unwrap();
//! let device = AdbBridge::new(&config.device);
//! let vlm = VlmClient::new(&config.vlm).unwrap();
//! let test = TestCase::new("T1", "Create a new vault named 'InternVault' and open it");
//! let result = Orchestrator::new(&device, &vlm, &config).run(&test);
//! println!("{}", result.summary_line());
//! ```

pub mod action;
pub mod classifier;
pub mod config;
pub mod demo;
pub mod device;
pub mod elements;
pub mod executor;
pub mod harness;
pub mod planner;
pub mod response;
pub mod runner;
pub mod session;
pub mod verifier;
pub mod vlm;

// Re-export runner types
pub use runner::{Outcome, RunResult, StepRecord, SuiteSummary};

// Re-export harness types
pub use harness::{CancelFlag, HarnessError, HarnessResult, Orchestrator, TestCase};

// Re-export the perception and decision pipeline
pub use action::Action;
pub use classifier::{ScreenClassifier, ScreenLabel};
pub use elements::{Element, ElementIndex, build_index};
pub use executor::Executor;
pub use planner::{GoalCategory, GoalProgress, Planner, Target};
pub use verifier::{FailureKind, Verdict, Verifier};

// Re-export collaborators
pub use config::Config;
pub use device::{AdbBridge, DeviceBridge, DeviceError, DeviceStatus, ScriptedDevice};
pub use session::Session;
pub use vlm::{InferenceService, ScriptedInference, VlmClient, VlmError, VlmResult, check_health};
