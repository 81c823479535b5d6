//! Run loop / orchestrator.
//!
//! One `Orchestrator::run` drives one goal:
//!
//! ```text
//! precheck (device present, app running) -> for step in 1..=max_steps:
//!     capture -> verify -> index + classify -> plan -> act -> record -> settle
//! ```
//!
//! A run ends on a completed verdict, a terminal planner action, budget
//! exhaustion or cancellation, and always produces a `RunResult`.

use chrono::Utc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::classifier::{ScreenClassifier, ScreenLabel};
use crate::config::Config;
use crate::device::{DeviceBridge, DeviceStatus, parse_device_list};
use crate::elements::{ElementIndex, build_index};
use crate::executor::Executor;
use crate::planner::Planner;
use crate::runner::{Outcome, RunResult, StepRecord, SuiteSummary};
use crate::session::{Session, write_summary};
use crate::verifier::{Verdict, Verifier};
use crate::vlm::InferenceService;

use super::types::{CancelFlag, HarnessError, HarnessResult, RunState, TestCase};

pub struct Orchestrator<'a> {
    device: &'a dyn DeviceBridge,
    vlm: &'a dyn InferenceService,
    config: &'a Config,
    classifier: ScreenClassifier,
    cancel: CancelFlag,
}

/// Outcome of a run before it is stamped into a `RunResult`
struct Finish {
    outcome: Outcome,
    reason: String,
    steps: u32,
}

impl Finish {
    fn fail(reason: impl Into<String>, steps: u32) -> Self {
        Self { outcome: Outcome::Fail, reason: reason.into(), steps }
    }

    fn from_verdict(verdict: &Verdict, steps: u32) -> Self {
        let outcome = if verdict.pass { Outcome::Pass } else { Outcome::Fail };
        let reason = match (&verdict.reason, outcome) {
            (r, Outcome::Pass) if r.is_empty() => "goal achieved".to_string(),
            (r, Outcome::Fail) if r.is_empty() => match verdict.failure_kind {
                Some(kind) => kind.to_string(),
                None => "verification failed".to_string(),
            },
            (r, _) => r.clone(),
        };
        Self { outcome, reason, steps }
    }
}

impl<'a> Orchestrator<'a> {
    pub fn new(device: &'a dyn DeviceBridge, vlm: &'a dyn InferenceService, config: &'a Config) -> Self {
        Self {
            device,
            vlm,
            config,
            classifier: ScreenClassifier::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one test case to a result
    pub fn run(&self, test: &TestCase) -> RunResult {
        let started_at = Utc::now();
        let session = Session::for_test(&self.config.run.artifacts_dir, &test.id);
        if let Err(e) = session.init(&test.goal, &self.config.device.package) {
            warn!(dir = %session.dir.display(), error = %e, "could not initialise artifact directory");
        }
        info!(test_id = %test.id, goal = %test.goal, "starting run");

        let mut history = Vec::new();
        let finish = self.drive(test, &session, &mut history);

        let result = RunResult {
            test_id: test.id.clone(),
            goal: test.goal.clone(),
            outcome: finish.outcome,
            reason: finish.reason,
            steps_taken: finish.steps,
            artifacts_path: session.dir.clone(),
            history,
            started_at,
            finished_at: Utc::now(),
        };
        session.write_result(&result);
        info!(
            test_id = %result.test_id,
            outcome = %result.outcome,
            steps = result.steps_taken,
            reason = %result.reason,
            "run finished"
        );
        result
    }

    /// Run test cases one after another and write `summary.json`.
    ///
    /// Cancellation stops the suite after the current run.
    pub fn run_suite(&self, tests: &[TestCase]) -> SuiteSummary {
        let mut results = Vec::with_capacity(tests.len());
        for test in tests {
            if self.cancel.is_cancelled() {
                warn!(remaining = tests.len() - results.len(), "suite cancelled");
                break;
            }
            results.push(self.run(test));
        }

        let summary = SuiteSummary::from_results(results);
        match write_summary(&self.config.run.artifacts_dir, &summary) {
            Ok(path) => debug!(path = %path.display(), "suite summary written"),
            Err(e) => warn!(error = %e, "could not write suite summary"),
        }
        summary
    }

    /// Device must be present; the app is launched only if not running
    pub fn precheck(&self) -> HarnessResult<()> {
        let listing = self
            .device
            .list_devices()
            .map_err(|e| HarnessError::DeviceNotFound(format!("device listing failed: {}", e)))?;
        match parse_device_list(&listing) {
            DeviceStatus::Present(serials) => debug!(?serials, "device present"),
            status => return Err(HarnessError::DeviceNotFound(status.to_string())),
        }

        let package = &self.config.device.package;
        match self.device.is_process_running(package) {
            Ok(true) => {
                info!(%package, "application already running, not relaunching");
                return Ok(());
            }
            Ok(false) => info!(%package, "application not running, launching"),
            Err(e) => warn!(%package, error = %e, "process check failed, launching"),
        }

        match self.device.launch(package) {
            Ok(true) => {
                sleep(self.config.run.timing.launch_settle);
                Ok(())
            }
            Ok(false) => Err(HarnessError::LaunchFailed(package.clone())),
            Err(e) => {
                warn!(%package, error = %e, "launch failed");
                Err(HarnessError::LaunchFailed(package.clone()))
            }
        }
    }

    fn drive(&self, test: &TestCase, session: &Session, history: &mut Vec<StepRecord>) -> Finish {
        let mut state = RunState::NotStarted;
        if let Err(e) = self.precheck() {
            warn!(test_id = %test.id, error = %e, "precondition failed");
            return Finish::fail(e.to_string(), 0);
        }

        let run = &self.config.run;
        let mut planner = Planner::new(&test.goal, &self.config.planner, &self.config.profile, run.free_planner);
        let verifier = Verifier::new(self.vlm);
        let executor = Executor::new(self.device, run.timing.honor_waits);
        let mut step = 0;

        while step < run.max_steps {
            if self.cancel.is_cancelled() {
                return Finish::fail("cancelled", step);
            }
            step += 1;
            transition(&mut state, RunState::Stepping, step);

            let screenshot = match self.device.capture() {
                Ok(png) => png,
                Err(e) => {
                    let err = HarnessError::from(e);
                    warn!(step, error = %err, "capture failed, step skipped");
                    history.push(StepRecord::failed(step, err.to_string()));
                    sleep(run.timing.step_delay);
                    continue;
                }
            };
            let shot_path = session.write_screenshot(step, &screenshot);

            transition(&mut state, RunState::Verifying, step);
            let verdict = verifier.verify(planner.goal(), &screenshot);
            if verdict.completed {
                transition(&mut state, RunState::Done, step);
                history.push(StepRecord {
                    step,
                    label: None,
                    action: None,
                    success: true,
                    error: None,
                    screenshot: shot_path,
                });
                return Finish::from_verdict(&verdict, step);
            }
            debug!(step, reason = %verdict.reason, "goal not complete");
            transition(&mut state, RunState::Stepping, step);

            let snapshot = match self.device.pull_accessibility_snapshot() {
                Ok(xml) => Some(xml),
                Err(e) => {
                    warn!(step, error = %HarnessError::from(e), "accessibility snapshot unavailable");
                    None
                }
            };
            let elements = snapshot
                .as_deref()
                .map(|xml| build_index(xml.as_bytes()))
                .unwrap_or_else(ElementIndex::empty);
            let label = self.classifier.classify(self.vlm, &screenshot, snapshot.as_deref());
            let action = planner.decide_next_action(self.vlm, label, &elements, &screenshot);
            info!(step, %label, action = %action, elements = elements.len(), "planned");

            match action {
                Action::Done => {
                    history.push(record(step, label, &action, true, None, shot_path));
                    transition(&mut state, RunState::Done, step);
                    return self.confirm_done(&verifier, &planner, session, step);
                }
                Action::Failed => {
                    history.push(record(step, label, &action, false, None, shot_path));
                    transition(&mut state, RunState::Done, step);
                    let reason = planner.failure_reason().unwrap_or("planner gave up").to_string();
                    return Finish::fail(HarnessError::ResolutionExhausted(reason).to_string(), step);
                }
                _ => {}
            }

            let execution = executor.run(&action, &elements);
            history.push(record(step, label, &action, execution.success, execution.error, shot_path));
            sleep(run.timing.step_delay);
        }

        transition(&mut state, RunState::Done, step);
        Finish::fail("max steps reached", step)
    }

    /// A planner `Done` only passes if a fresh frame verifies
    fn confirm_done(&self, verifier: &Verifier<'_>, planner: &Planner, session: &Session, step: u32) -> Finish {
        let screenshot = match self.device.capture() {
            Ok(png) => png,
            Err(e) => {
                return Finish::fail(
                    format!("planner reported done but the final frame could not be captured: {}", e),
                    step,
                );
            }
        };
        session.write_final(&screenshot);

        let verdict = verifier.verify(planner.goal(), &screenshot);
        if verdict.completed {
            Finish::from_verdict(&verdict, step)
        } else {
            Finish::fail(
                format!("planner reported done but verification did not confirm it: {}", verdict.reason),
                step,
            )
        }
    }
}

fn record(
    step: u32,
    label: ScreenLabel,
    action: &Action,
    success: bool,
    error: Option<String>,
    screenshot: Option<std::path::PathBuf>,
) -> StepRecord {
    StepRecord {
        step,
        label: Some(label),
        action: Some(action.to_string()),
        success,
        error,
        screenshot,
    }
}

fn transition(state: &mut RunState, next: RunState, step: u32) {
    if *state != next {
        debug!(step, from = ?*state, to = ?next, "run state");
        *state = next;
    }
}

fn sleep(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}
