//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Process-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Session policy
    #[serde(default)]
    pub session: RawSessionConfig,
}

/// Process-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the audit log and file backend
    pub data_dir: Option<PathBuf>,
}

/// Session policy settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionConfig {
    /// Violations that force an automatic submission
    pub escalation_threshold: Option<u32>,

    /// Seconds between proctoring sensor polls
    pub proctoring_poll_seconds: Option<u64>,

    /// Seconds between autosave cycles
    pub autosave_interval_seconds: Option<u64>,

    /// Low-time warnings (defaults apply when omitted)
    pub warnings: Option<Vec<RawWarningThreshold>>,
}

/// Raw low-time warning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawWarningThreshold {
    pub seconds_before: u64,

    #[serde(default)]
    pub severity: RawSeverity,

    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RawSeverity {
    Info,
    #[default]
    Warn,
    Critical,
}
