use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveType {
    Wfh,
    FullDay,
    HalfDay,
    LateArrival,
    EarlyDeparture,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown leave type `{0}`")]
pub struct UnknownLeaveType(pub String);

impl LeaveType {
    pub const ALL: [LeaveType; 5] = [
        LeaveType::Wfh,
        LeaveType::FullDay,
        LeaveType::HalfDay,
        LeaveType::LateArrival,
        LeaveType::EarlyDeparture,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wfh => "WFH",
            Self::FullDay => "FULL_DAY",
            Self::HalfDay => "HALF_DAY",
            Self::LateArrival => "LATE_ARRIVAL",
            Self::EarlyDeparture => "EARLY_DEPARTURE",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::Wfh => "🏠",
            Self::FullDay => "🌴",
            Self::HalfDay => "🌓",
            Self::LateArrival => "⏰",
            Self::EarlyDeparture => "🏃",
        }
    }

    /// Noun phrase used in confirmations ("Your full day leave has been recorded").
    pub fn label(self) -> &'static str {
        match self {
            Self::Wfh => "WFH",
            Self::FullDay => "full day leave",
            Self::HalfDay => "half day leave",
            Self::LateArrival => "late arrival",
            Self::EarlyDeparture => "early departure",
        }
    }

    pub fn status_line(self) -> &'static str {
        match self {
            Self::Wfh => "🏠 Working remotely",
            Self::FullDay => "🌴 Out of office",
            Self::HalfDay => "🌓 Partially available",
            Self::LateArrival => "⏰ Arriving late",
            Self::EarlyDeparture => "🏃 Leaving early",
        }
    }
}

impl FromStr for LeaveType {
    type Err = UnknownLeaveType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "WFH" => Ok(Self::Wfh),
            "FULL_DAY" => Ok(Self::FullDay),
            "HALF_DAY" => Ok(Self::HalfDay),
            "LATE_ARRIVAL" => Ok(Self::LateArrival),
            "EARLY_DEPARTURE" => Ok(Self::EarlyDeparture),
            other => Err(UnknownLeaveType(other.to_string())),
        }
    }
}

impl fmt::Display for LeaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structurally complete reading of a message, not yet checked against the
/// calendar rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CandidateLeave {
    pub leave_type: LeaveType,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub duration_label: String,
    pub reason: String,
}

/// What the interpretation service made of a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InterpretedLeave {
    Candidate(CandidateLeave),
    /// The service itself judged the request invalid. Never persisted.
    Declined { error_message: String },
}

impl InterpretedLeave {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Candidate(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveId(pub i64);

impl fmt::Display for LeaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLeave {
    pub username: String,
    pub original_text: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_label: String,
    pub reason: String,
    pub leave_type: LeaveType,
}

/// Persisted leave. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Leave {
    pub id: LeaveId,
    pub username: String,
    pub original_text: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_label: String,
    pub reason: String,
    pub leave_type: LeaveType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Leave {
    pub fn hours(&self) -> f64 {
        span_hours(self.start_time, self.end_time)
    }
}

pub fn span_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 3600.0
}
