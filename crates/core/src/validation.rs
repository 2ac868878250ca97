use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::clock::{Clock, OrgTimeZone};
use crate::domain::leave::{CandidateLeave, LeaveType, NewLeave};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeaveRejection {
    PastDate { start_date: NaiveDate, today: NaiveDate },
    TooFarInAdvance { start_date: NaiveDate, max_date: NaiveDate, max_advance_days: u32 },
    EndBeforeStart { start_time: DateTime<FixedOffset>, end_time: DateTime<FixedOffset> },
}

impl LeaveRejection {
    /// Sentence shown to the employee.
    pub fn reason(&self) -> String {
        match self {
            Self::PastDate { .. } => "Cannot request leave for past dates".to_string(),
            Self::TooFarInAdvance { max_date, max_advance_days, .. } => format!(
                "Cannot request leave more than {max_advance_days} days in advance (maximum allowed date is {})",
                max_date.format("%B %-d, %Y")
            ),
            Self::EndBeforeStart { .. } => "End time must be after start time".to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::PastDate { .. } => "past_date",
            Self::TooFarInAdvance { .. } => "too_far_in_advance",
            Self::EndBeforeStart { .. } => "end_before_start",
        }
    }
}

/// A candidate that passed every rule, with both timestamps in the
/// organization's offset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AcceptedLeave {
    pub leave_type: LeaveType,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub duration_label: String,
    pub reason: String,
}

impl AcceptedLeave {
    pub fn into_new_leave(self, username: impl Into<String>, original_text: impl Into<String>) -> NewLeave {
        NewLeave {
            username: username.into(),
            original_text: original_text.into(),
            start_time: self.start_time.with_timezone(&Utc),
            end_time: self.end_time.with_timezone(&Utc),
            duration_label: self.duration_label,
            reason: self.reason,
            leave_type: self.leave_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Accepted(AcceptedLeave),
    Rejected(LeaveRejection),
}

/// Calendar rules applied to every candidate before it is stored.
///
/// Rules run in a fixed order and the first failure wins: past start date,
/// start date beyond the advance window, then end not after start.
#[derive(Clone, Debug)]
pub struct LeaveValidator {
    zone: OrgTimeZone,
    max_advance_days: u32,
}

impl LeaveValidator {
    pub fn new(zone: OrgTimeZone, max_advance_days: u32) -> Self {
        Self { zone, max_advance_days }
    }

    pub fn zone(&self) -> &OrgTimeZone {
        &self.zone
    }

    pub fn max_advance_days(&self) -> u32 {
        self.max_advance_days
    }

    /// Last civil date a leave may start on.
    pub fn max_date(&self, today: NaiveDate) -> NaiveDate {
        today + Duration::days(i64::from(self.max_advance_days))
    }

    pub fn validate(&self, candidate: CandidateLeave, clock: &dyn Clock) -> ValidationOutcome {
        let start_time = self.zone.to_local(candidate.start_time);
        let end_time = self.zone.to_local(candidate.end_time);

        let start_date = start_time.date_naive();
        let today = self.zone.today(clock);
        let max_date = self.max_date(today);

        if start_date < today {
            return ValidationOutcome::Rejected(LeaveRejection::PastDate { start_date, today });
        }

        if start_date > max_date {
            return ValidationOutcome::Rejected(LeaveRejection::TooFarInAdvance {
                start_date,
                max_date,
                max_advance_days: self.max_advance_days,
            });
        }

        if end_time <= start_time {
            return ValidationOutcome::Rejected(LeaveRejection::EndBeforeStart {
                start_time,
                end_time,
            });
        }

        ValidationOutcome::Accepted(AcceptedLeave {
            leave_type: candidate.leave_type,
            start_time,
            end_time,
            duration_label: candidate.duration_label,
            reason: candidate.reason,
        })
    }
}
