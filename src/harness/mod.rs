pub mod run_loop;
pub mod types;

pub use run_loop::Orchestrator;
pub use types::{
    CancelFlag, HarnessError, HarnessResult, RunState, TestCase, default_suite, load_suite,
};
