//! Configuration validation

use crate::schema::{RawConfig, RawSessionConfig};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("escalation_threshold must be at least 1")]
    ZeroEscalationThreshold,

    #[error("{field} must be at least 1 second")]
    ZeroInterval { field: &'static str },

    #[error("Warning threshold must be at least 1 second before expiry")]
    ZeroWarningThreshold,

    #[error("Duplicate warning threshold: {0}s")]
    DuplicateWarning(u64),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    validate_session(&config.session)
}

fn validate_session(session: &RawSessionConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if session.escalation_threshold == Some(0) {
        errors.push(ValidationError::ZeroEscalationThreshold);
    }

    if session.proctoring_poll_seconds == Some(0) {
        errors.push(ValidationError::ZeroInterval {
            field: "proctoring_poll_seconds",
        });
    }

    if session.autosave_interval_seconds == Some(0) {
        errors.push(ValidationError::ZeroInterval {
            field: "autosave_interval_seconds",
        });
    }

    if let Some(warnings) = &session.warnings {
        let mut seen = HashSet::new();
        for warning in warnings {
            if warning.seconds_before == 0 {
                errors.push(ValidationError::ZeroWarningThreshold);
            } else if !seen.insert(warning.seconds_before) {
                errors.push(ValidationError::DuplicateWarning(warning.seconds_before));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawSeverity, RawWarningThreshold};

    fn warning(seconds_before: u64) -> RawWarningThreshold {
        RawWarningThreshold {
            seconds_before,
            severity: RawSeverity::Warn,
            message: None,
        }
    }

    fn config_with(session: RawSessionConfig) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            session,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let errors = validate_config(&config_with(RawSessionConfig::default()));
        assert!(errors.is_empty());
    }

    #[test]
    fn zero_values_rejected() {
        let errors = validate_config(&config_with(RawSessionConfig {
            escalation_threshold: Some(0),
            proctoring_poll_seconds: Some(0),
            autosave_interval_seconds: Some(0),
            warnings: Some(vec![warning(0)]),
        }));

        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroEscalationThreshold));
        assert!(errors.contains(&ValidationError::ZeroInterval {
            field: "autosave_interval_seconds"
        }));
        assert!(errors.contains(&ValidationError::ZeroWarningThreshold));
    }

    #[test]
    fn duplicate_warnings_rejected() {
        let errors = validate_config(&config_with(RawSessionConfig {
            warnings: Some(vec![warning(300), warning(60), warning(300)]),
            ..Default::default()
        }));

        assert_eq!(errors, vec![ValidationError::DuplicateWarning(300)]);
    }
}
