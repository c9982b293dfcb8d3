//! Proctoring violation tracking

use chrono::{DateTime, Local};
use proctor_api::{SessionStatus, ViolationRecord};

use crate::{CoreError, CoreResult};

/// Signal produced by [`ViolationTracker::record_violation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationEvent {
    /// Count reached the escalation threshold. Emitted once per tracker.
    Escalated { count: usize },
}

/// Accumulates violations reported by the proctoring sensor and signals
/// escalation.
///
/// The record list is append-only; `count()` is its length.
#[derive(Debug)]
pub struct ViolationTracker {
    records: Vec<ViolationRecord>,
    escalation_threshold: u32,
    escalated: bool,
    sealed: Option<SessionStatus>,
}

impl ViolationTracker {
    /// A threshold of zero is treated as one: the first violation escalates.
    pub fn new(escalation_threshold: u32) -> Self {
        Self {
            records: Vec::new(),
            escalation_threshold: escalation_threshold.max(1),
            escalated: false,
            sealed: None,
        }
    }

    /// Append a violation.
    ///
    /// Returns `Some(Escalated)` on the violation that first brings the count
    /// to the threshold. Later violations are recorded without re-emitting.
    /// Fails once the tracker has been sealed by a finished session.
    pub fn record_violation(
        &mut self,
        detail: impl Into<String>,
        now: DateTime<Local>,
    ) -> CoreResult<Option<ViolationEvent>> {
        if let Some(status) = self.sealed {
            return Err(CoreError::not_running(status));
        }

        self.records.push(ViolationRecord {
            timestamp: now,
            detail: detail.into(),
        });

        let count = self.records.len();
        if !self.escalated && count >= self.escalation_threshold as usize {
            self.escalated = true;
            return Ok(Some(ViolationEvent::Escalated { count }));
        }
        Ok(None)
    }

    /// Refuse further violations. Called when the session reaches `status`;
    /// a later terminal status replaces an earlier one.
    pub fn seal(&mut self, status: SessionStatus) {
        self.sealed = Some(status);
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn escalation_threshold(&self) -> u32 {
        self.escalation_threshold
    }

    pub fn has_escalated(&self) -> bool {
        self.escalated
    }

    pub fn records(&self) -> &[ViolationRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_exactly_once_at_threshold() {
        for threshold in 1..=6u32 {
            let mut tracker = ViolationTracker::new(threshold);
            let now = proctor_util::now();

            let mut escalations = Vec::new();
            for n in 1..=10usize {
                if let Some(event) = tracker.record_violation(format!("v{}", n), now).unwrap() {
                    escalations.push((n, event));
                }
            }

            assert_eq!(
                escalations,
                vec![(
                    threshold as usize,
                    ViolationEvent::Escalated {
                        count: threshold as usize
                    }
                )]
            );
            assert_eq!(tracker.count(), 10);
        }
    }

    #[test]
    fn count_matches_records() {
        let mut tracker = ViolationTracker::new(3);
        let now = proctor_util::now();

        tracker.record_violation("tab switch", now).unwrap();
        tracker.record_violation("multiple faces", now).unwrap();

        assert_eq!(tracker.count(), tracker.records().len());
        assert_eq!(tracker.records()[1].detail, "multiple faces");
        assert!(!tracker.has_escalated());
    }

    #[test]
    fn sealed_tracker_rejects_violations() {
        let mut tracker = ViolationTracker::new(3);
        let now = proctor_util::now();
        tracker.record_violation("tab switch", now).unwrap();

        tracker.seal(SessionStatus::Submitted);

        let err = tracker.record_violation("late", now).unwrap_err();
        assert_eq!(err, CoreError::not_running(SessionStatus::Submitted));
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn reseal_reports_latest_status() {
        let mut tracker = ViolationTracker::new(3);
        let now = proctor_util::now();

        tracker.seal(SessionStatus::Failed);
        tracker.seal(SessionStatus::Submitted);

        let err = tracker.record_violation("late", now).unwrap_err();
        assert_eq!(err, CoreError::not_running(SessionStatus::Submitted));
    }

    #[test]
    fn zero_threshold_escalates_on_first() {
        let mut tracker = ViolationTracker::new(0);
        assert_eq!(tracker.escalation_threshold(), 1);
        let event = tracker.record_violation("x", proctor_util::now()).unwrap();
        assert_eq!(event, Some(ViolationEvent::Escalated { count: 1 }));
    }
}
