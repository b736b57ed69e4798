use std::{fmt::Display, io::ErrorKind, path::PathBuf};

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fs::operations::write_atomically;

pub const DEFAULT_TARGET_SECONDS: u64 = 6 * 3600;
const TARGET_STEP_SECONDS: u64 = 1800;
const MAX_TARGET_SECONDS: u64 = 24 * 3600;

/// What happens to a running session when the day changes under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RolloverPolicy {
    /// Only the accumulated baseline is zeroed.
    #[default]
    ResetAccumulated,
    /// The accumulated baseline is zeroed and a running session restarts at the moment of the
    /// rollover, dropping everything timed before midnight.
    RestartSession,
    /// The timer is left alone, the whole session goes to the day it is stopped on.
    CarryOver,
}

impl Display for RolloverPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RolloverPolicy::ResetAccumulated => write!(f, "reset-accumulated"),
            RolloverPolicy::RestartSession => write!(f, "restart-session"),
            RolloverPolicy::CarryOver => write!(f, "carry-over"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Daily goal used for progress ratios.
    #[serde(default = "default_target")]
    pub target_seconds: u64,
    #[serde(default)]
    pub rollover_policy: RolloverPolicy,
}

fn default_target() -> u64 {
    DEFAULT_TARGET_SECONDS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_seconds: DEFAULT_TARGET_SECONDS,
            rollover_policy: RolloverPolicy::default(),
        }
    }
}

/// Targets picked by a user move in 30 minute steps between 30 minutes and a day.
pub fn snap_target(seconds: u64) -> u64 {
    let clamped = seconds.clamp(TARGET_STEP_SECONDS, MAX_TARGET_SECONDS);
    clamped / TARGET_STEP_SECONDS * TARGET_STEP_SECONDS
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Missing or unreadable settings fall back to defaults.
    pub async fn load(&self) -> Result<Settings> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable settings in {:?}: {e}", self.path);
            Settings::default()
        }))
    }

    pub async fn save(&self, settings: &Settings) -> Result<()> {
        write_atomically(&self.path, &serde_json::to_vec_pretty(settings)?).await?;
        Ok(())
    }
}
