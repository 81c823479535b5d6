use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use droid_vision::config::{Config, DeviceProfile, Timing};
use droid_vision::demo::{demo_test, vault_scenario};
use droid_vision::device::{AdbBridge, DeviceBridge, parse_device_list};
use droid_vision::elements::build_index;
use droid_vision::harness::{CancelFlag, HarnessError, Orchestrator, TestCase, default_suite, load_suite};
use droid_vision::runner::{RunResult, SuiteSummary};
use droid_vision::vlm::{VlmClient, check_health};
use droid_vision::ScreenClassifier;

/// Droid Vision - closed-loop Android UI testing with vision model guidance
#[derive(Parser, Debug)]
#[command(
    name = "droid-vision",
    about = "Drive an Android app towards natural-language goals and report PASS/FAIL",
    after_help = "ENVIRONMENT VARIABLES:\n\
        DROID_VISION_VLM_ENDPOINT    Inference API endpoint URL\n\
        DROID_VISION_VLM_MODEL       Inference model name\n\
        DROID_VISION_VLM_API_KEY     Bearer token (falls back to GEMINI_API_KEY)\n\
        DROID_VISION_ADB             adb executable\n\
        DROID_VISION_SERIAL          Target device serial\n\
        DROID_VISION_PACKAGE         Application package under test\n\
        DROID_VISION_MAX_STEPS       Step budget per run\n\
        DROID_VISION_ARTIFACTS_DIR   Base directory for run artifacts\n\
        DROID_VISION_PROFILE         Device profile JSON file\n\
        RUST_LOG                     Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single goal against the connected device
    Run {
        /// Natural-language goal
        #[arg(short, long)]
        goal: String,

        /// Test identifier, also the artifact subdirectory
        #[arg(long, default_value = "T1")]
        id: String,

        /// Step budget
        #[arg(short, long)]
        max_steps: Option<u32>,

        /// Base directory for artifacts
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a suite of goals sequentially (default: the built-in Obsidian suite)
    Suite {
        /// JSON file with an array of {"id", "goal"} objects
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Step budget per test
        #[arg(short, long)]
        max_steps: Option<u32>,

        /// Base directory for artifacts
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show whether a device is attached
    Devices,

    /// Classify a single screenshot
    Classify {
        /// PNG screenshot
        #[arg(short, long)]
        image: PathBuf,

        /// uiautomator dump taken with the screenshot
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Run the vault-creation scenario against a scripted device and model
    Demo {
        /// Base directory for artifacts
        #[arg(short, long, default_value = "artifacts")]
        artifacts: PathBuf,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(max_steps: Option<u32>, artifacts: Option<PathBuf>) -> Result<Config, HarnessError> {
    let mut config = Config::from_env()?;
    if let Some(max_steps) = max_steps {
        config = config.with_max_steps(max_steps);
    }
    if let Some(dir) = artifacts {
        config = config.with_artifacts_dir(dir);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    init_tracing();
    let args = Args::parse();

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current step");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Some(Commands::Run {
            goal,
            id,
            max_steps,
            artifacts,
            json,
        }) => {
            let config = load_config(max_steps, artifacts)?;
            let test = TestCase::new(id, goal);
            // The blocking HTTP client must live outside the async runtime
            let result = tokio::task::spawn_blocking(move || -> Result<RunResult, HarnessError> {
                let device = AdbBridge::new(&config.device);
                let vlm = VlmClient::new(&config.vlm)?;
                Ok(Orchestrator::new(&device, &vlm, &config).with_cancel(cancel).run(&test))
            })
            .await??;

            print_result(&result, json)?;
            Ok(exit_code(result.passed()))
        }

        Some(Commands::Suite {
            file,
            max_steps,
            artifacts,
            json,
        }) => {
            let config = load_config(max_steps, artifacts)?;
            let tests = match file {
                Some(path) => load_suite(&path)?,
                None => default_suite(),
            };

            let summary = tokio::task::spawn_blocking(move || -> Result<SuiteSummary, HarnessError> {
                if !check_health(&config.vlm.endpoint, 5) {
                    warn!(endpoint = %config.vlm.endpoint, "inference endpoint not responding, runs will degrade to safe defaults");
                }
                let device = AdbBridge::new(&config.device);
                let vlm = VlmClient::new(&config.vlm)?;
                Ok(Orchestrator::new(&device, &vlm, &config).with_cancel(cancel).run_suite(&tests))
            })
            .await??;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for result in &summary.results {
                    println!("{}", result.summary_line());
                    println!("   Artifacts: {}", result.artifacts_path.display());
                }
                println!();
                println!("{}/{} passed", summary.passed, summary.total);
            }
            Ok(exit_code(summary.all_passed()))
        }

        Some(Commands::Devices) => {
            let config = Config::from_env()?;
            let status = tokio::task::spawn_blocking(move || {
                AdbBridge::new(&config.device).list_devices().map(|raw| parse_device_list(&raw))
            })
            .await??;
            println!("{}", status);
            Ok(exit_code(status.is_present()))
        }

        Some(Commands::Classify { image, snapshot }) => {
            let config = Config::from_env()?;
            let png = std::fs::read(&image)?;
            let xml = snapshot.map(std::fs::read_to_string).transpose()?;

            let label = tokio::task::spawn_blocking(move || -> Result<_, HarnessError> {
                let vlm = VlmClient::new(&config.vlm)?;
                Ok(ScreenClassifier::default().classify(&vlm, &png, xml.as_deref()))
            })
            .await??;
            println!("{}", label);
            Ok(ExitCode::SUCCESS)
        }

        Some(Commands::Demo { artifacts, json }) => {
            let config = Config::defaults()
                .with_timing(Timing::instant())
                .with_artifacts_dir(artifacts)
                .with_profile(DeviceProfile::bare(360, 800));
            let result = tokio::task::spawn_blocking(move || {
                let (device, vlm) = vault_scenario();
                let result = Orchestrator::new(&device, &vlm, &config).with_cancel(cancel).run(&demo_test());
                info!(injected = device.injected().len(), model_calls = vlm.call_count(), "demo finished");
                result
            })
            .await?;

            print_result(&result, json)?;
            Ok(exit_code(result.passed()))
        }

        None => {
            println!("Droid Vision - closed-loop Android UI testing with vision model guidance");
            println!();
            println!("Usage: droid-vision <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run       Run a single goal against the connected device");
            println!("  suite     Run a suite of goals (default: built-in Obsidian suite)");
            println!("  devices   Show whether a device is attached");
            println!("  classify  Classify a single screenshot");
            println!("  demo      Run the vault scenario against a scripted device");
            println!();
            println!("Run with --help for more information.");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_result(result: &RunResult, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.summary_line());
    for record in &result.history {
        let label = record.label.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
        let action = record.action.as_deref().unwrap_or("-");
        let status = if record.success { "ok" } else { "failed" };
        let error = record
            .error
            .as_ref()
            .map(|e| format!(" ({})", e))
            .unwrap_or_default();
        println!("  Step {:02} [{}] {} → {}{}", record.step, label, action, status, error);
    }
    println!("   Artifacts: {}", result.artifacts_path.display());
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
