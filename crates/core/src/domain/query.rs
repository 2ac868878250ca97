use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    TopEmployee,
    PeriodStats,
    EmployeeStats,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopEmployee => "top_employee",
            Self::PeriodStats => "period_stats",
            Self::EmployeeStats => "employee_stats",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "top_employee" => Some(Self::TopEmployee),
            "period_stats" => Some(Self::PeriodStats),
            "employee_stats" => Some(Self::EmployeeStats),
            _ => None,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved analytics question. Each variant carries exactly the fields its
/// aggregation needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "query_type", rename_all = "snake_case")]
pub enum QueryIntent {
    TopEmployee,
    /// Both dates inclusive, `start <= end`.
    PeriodStats { start_date: NaiveDate, end_date: NaiveDate },
    EmployeeStats { username: String },
}

impl QueryIntent {
    pub fn query_type(&self) -> QueryType {
        match self {
            Self::TopEmployee => QueryType::TopEmployee,
            Self::PeriodStats { .. } => QueryType::PeriodStats,
            Self::EmployeeStats { .. } => QueryType::EmployeeStats,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaveStats {
    pub username: String,
    pub leave_count: i64,
    /// Distinct leave types, sorted and joined with `, `.
    pub leave_types: String,
    pub total_hours: f64,
}
