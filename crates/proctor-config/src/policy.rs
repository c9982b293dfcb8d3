//! Validated policy structures

use crate::schema::{RawConfig, RawServiceConfig, RawSessionConfig, RawSeverity, RawWarningThreshold};
use proctor_api::{WarningSeverity, WarningThreshold};
use std::path::PathBuf;
use std::time::Duration;

/// Violations before an automatic submission when not configured
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 3;

/// Seconds between proctoring polls when not configured
pub const DEFAULT_PROCTORING_POLL_SECONDS: u64 = 5;

/// Seconds between autosave cycles when not configured
pub const DEFAULT_AUTOSAVE_INTERVAL_SECONDS: u64 = 10;

/// Validated policy ready for use by the session core
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub service: ServiceConfig,
    pub session: SessionPolicy,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            session: SessionPolicy::from_raw(raw.session),
        }
    }
}

/// Process-level configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw
                .data_dir
                .unwrap_or_else(proctor_util::default_data_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: proctor_util::default_data_dir(),
        }
    }
}

/// Rules applied to every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Violation count that forces an automatic submission
    pub escalation_threshold: u32,

    /// Interval between proctoring sensor polls
    pub proctoring_poll_interval: Duration,

    /// Interval between autosave cycles
    pub autosave_interval: Duration,

    /// Low-time warnings, largest threshold first
    pub warnings: Vec<WarningThreshold>,
}

impl SessionPolicy {
    fn from_raw(raw: RawSessionConfig) -> Self {
        let mut warnings: Vec<WarningThreshold> = raw
            .warnings
            .map(|w| w.into_iter().map(convert_warning).collect())
            .unwrap_or_else(default_warning_thresholds);
        warnings.sort_by(|a, b| b.seconds_before.cmp(&a.seconds_before));

        Self {
            escalation_threshold: raw
                .escalation_threshold
                .unwrap_or(DEFAULT_ESCALATION_THRESHOLD),
            proctoring_poll_interval: Duration::from_secs(
                raw.proctoring_poll_seconds
                    .unwrap_or(DEFAULT_PROCTORING_POLL_SECONDS),
            ),
            autosave_interval: Duration::from_secs(
                raw.autosave_interval_seconds
                    .unwrap_or(DEFAULT_AUTOSAVE_INTERVAL_SECONDS),
            ),
            warnings,
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from_raw(RawSessionConfig::default())
    }
}

fn convert_warning(raw: RawWarningThreshold) -> WarningThreshold {
    WarningThreshold {
        seconds_before: raw.seconds_before,
        severity: match raw.severity {
            RawSeverity::Info => WarningSeverity::Info,
            RawSeverity::Warn => WarningSeverity::Warn,
            RawSeverity::Critical => WarningSeverity::Critical,
        },
        message: raw.message,
    }
}

fn default_warning_thresholds() -> Vec<WarningThreshold> {
    vec![
        WarningThreshold {
            seconds_before: 300,
            severity: WarningSeverity::Warn,
            message: Some("5 minutes remaining".into()),
        },
        WarningThreshold {
            seconds_before: 60,
            severity: WarningSeverity::Critical,
            message: Some("1 minute remaining".into()),
        },
    ]
}
