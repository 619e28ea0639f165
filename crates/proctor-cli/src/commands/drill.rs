//! `proctor drill`: run a scripted session against a simulated host.
//!
//! A drill script is TOML. Each step fires at an offset from the start of
//! the drill and either sends a session command or pokes the simulated host:
//!
//! ```toml
//! settle_ms = 200
//!
//! [[steps]]
//! at_ms = 0
//! session = { action = "advance" }
//!
//! [[steps]]
//! at_ms = 0
//! session = { action = "set_consent", given = true }
//!
//! [[steps]]
//! at_ms = 1500
//! host = "blur_and_return"
//! ```
//!
//! After the last step and `settle_ms`, the session is closed and its report
//! is printed as JSON on stdout. Rejected commands are recorded in the
//! output, they do not stop the drill.
//!
//! # Exit Codes
//!
//! - 0: drill ran to completion
//! - 1: the configuration or script is invalid
//! - 2: the configuration or script could not be read or parsed

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use proctor_core::host::sim::{SimResponse, SimulatedHost};
use proctor_core::{
    HostCapabilities, InMemorySink, ProctorConfig, SessionCommand, SessionReport, spawn_session,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use super::exit_codes;
use super::validate::{exit_code_for, load_config};

/// Maximum number of steps in one script.
pub const MAX_STEPS: usize = 10_000;

/// Arguments for `proctor drill`.
#[derive(Debug, Args)]
pub struct DrillArgs {
    /// Path to the proctor configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the drill script
    #[arg(short, long)]
    pub script: PathBuf,
}

/// Something the simulated candidate or operating system does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostAction {
    /// Hide the page and show it again.
    BlurAndReturn,
    /// Hide the page.
    Hide,
    /// Show the page.
    Show,
    /// Stop screen sharing from outside the application.
    RevokeCapture,
    /// Leave exclusive display mode from outside the application.
    PressEscape,
    /// Decline later capture prompts.
    DenyCapture,
    /// Accept later capture prompts.
    GrantCapture,
    /// Decline later exclusive display requests.
    DenyLockdown,
    /// Accept later exclusive display requests.
    GrantLockdown,
}

impl HostAction {
    fn apply(self, host: &SimulatedHost) {
        match self {
            Self::BlurAndReturn => host.blur_and_return(),
            Self::Hide => host.set_hidden(true),
            Self::Show => host.set_hidden(false),
            Self::RevokeCapture => host.revoke_capture(),
            Self::PressEscape => host.press_escape(),
            Self::DenyCapture => host.set_capture_response(SimResponse::Deny),
            Self::GrantCapture => host.set_capture_response(SimResponse::Grant),
            Self::DenyLockdown => host.set_lockdown_response(SimResponse::Deny),
            Self::GrantLockdown => host.set_lockdown_response(SimResponse::Grant),
        }
    }
}

/// One scripted step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillStep {
    /// Offset from the start of the drill.
    pub at_ms: u64,
    /// Session command to send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionCommand>,
    /// Host action to perform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostAction>,
}

/// A parsed drill script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillScript {
    /// Time to wait after the last step before closing.
    #[serde(default)]
    pub settle_ms: u64,
    /// Steps, fired in order.
    #[serde(default)]
    pub steps: Vec<DrillStep>,
}

/// Script problems found before anything runs.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The script has too many steps.
    #[error("script has {count} steps, at most {max} allowed")]
    TooManySteps {
        /// Number of steps.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// A step has neither or both of `session` and `host`.
    #[error("step {index} must set exactly one of `session` or `host`")]
    AmbiguousStep {
        /// Zero-based step index.
        index: usize,
    },
    /// Steps are not in time order.
    #[error("step {index} fires at {at_ms}ms, before the step preceding it")]
    OutOfOrder {
        /// Zero-based step index.
        index: usize,
        /// The step's offset.
        at_ms: u64,
    },
}

impl DrillScript {
    /// Parses a script from TOML.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the script is malformed.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Checks step count, step shape and ordering.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScriptError`] found.
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.steps.len() > MAX_STEPS {
            return Err(ScriptError::TooManySteps {
                count: self.steps.len(),
                max: MAX_STEPS,
            });
        }
        let mut last = 0;
        for (index, step) in self.steps.iter().enumerate() {
            if step.session.is_some() == step.host.is_some() {
                return Err(ScriptError::AmbiguousStep { index });
            }
            if step.at_ms < last {
                return Err(ScriptError::OutOfOrder {
                    index,
                    at_ms: step.at_ms,
                });
            }
            last = step.at_ms;
        }
        Ok(())
    }
}

/// A session command the session refused.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedStep {
    /// Zero-based step index.
    pub index: usize,
    /// Command name.
    pub action: &'static str,
    /// Error message.
    pub error: String,
}

/// Host resources still held after the drill.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HostState {
    /// Live capture tracks.
    pub live_tracks: usize,
    /// Whether exclusive display mode is held.
    pub lockdown_active: bool,
    /// Live visibility subscriptions.
    pub active_listeners: usize,
}

/// Everything a drill prints.
#[derive(Debug, Serialize)]
pub struct DrillOutcome {
    /// The session's final report.
    pub report: SessionReport,
    /// Commands the session refused.
    pub rejected: Vec<RejectedStep>,
    /// Host state after the session closed.
    pub host: HostState,
}

/// Runs a validated script against a fresh simulated host.
///
/// # Errors
///
/// Returns an error if the session cannot be created or its task panics.
pub async fn execute(config: &ProctorConfig, script: &DrillScript) -> Result<DrillOutcome> {
    let host = SimulatedHost::new();
    let sink = Arc::new(InMemorySink::new());
    let (session, task) = spawn_session(config, HostCapabilities::from_host(host.clone()), sink)
        .context("failed to create session")?;

    let start = Instant::now();
    let mut rejected = Vec::new();
    for (index, step) in script.steps.iter().enumerate() {
        tokio::time::sleep_until(start + Duration::from_millis(step.at_ms)).await;
        if let Some(action) = step.host {
            info!(index, ?action, "drill host action");
            action.apply(&host);
        }
        if let Some(command) = step.session.clone() {
            let action = command.name();
            info!(index, action, "drill session command");
            if let Err(err) = session.execute(command).await {
                warn!(index, action, error = %err, "drill command rejected");
                rejected.push(RejectedStep {
                    index,
                    action,
                    error: err.to_string(),
                });
            }
        }
    }
    tokio::time::sleep(Duration::from_millis(script.settle_ms)).await;

    session.close().await;
    let report = task.await.context("session task failed")?;
    Ok(DrillOutcome {
        report,
        rejected,
        host: HostState {
            live_tracks: host.live_tracks(),
            lockdown_active: host.lockdown_active(),
            active_listeners: host.active_listeners(),
        },
    })
}

fn load_script(path: &Path) -> Result<DrillScript, u8> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        eprintln!("{}: {err}", path.display());
        exit_codes::INPUT_ERROR
    })?;
    let script = DrillScript::from_toml(&content).map_err(|err| {
        eprintln!("{}: {err}", path.display());
        exit_codes::INPUT_ERROR
    })?;
    script.validate().map_err(|err| {
        eprintln!("{}: {err}", path.display());
        exit_codes::VALIDATION_ERROR
    })?;
    Ok(script)
}

/// Runs `proctor drill`, returning the exit code.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built or the session fails.
pub fn run_drill(args: &DrillArgs) -> Result<u8> {
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}: {err}", args.config.display());
            return Ok(exit_code_for(&err));
        },
    };
    let script = match load_script(&args.script) {
        Ok(script) => script,
        Err(code) => return Ok(code),
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let outcome = rt.block_on(execute(&config, &script))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("failed to render drill outcome")?
    );
    Ok(exit_codes::SUCCESS)
}
