use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use attendly_core::domain::leave::{Leave, LeaveId, NewLeave};
use attendly_core::domain::query::LeaveStats;

pub mod leave;
pub mod memory;

pub use leave::SqlLeaveRepository;
pub use memory::InMemoryLeaveRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persistence gateway for leave records.
///
/// Every statistics method groups by username and orders by leave count
/// descending, then username ascending, so ties resolve alphabetically.
#[async_trait]
pub trait LeaveRepository: Send + Sync {
    async fn create(&self, leave: NewLeave) -> Result<LeaveId, RepositoryError>;

    async fn find_by_id(&self, id: LeaveId) -> Result<Option<Leave>, RepositoryError>;

    /// Leaves whose `start_time` lies in `[from, until)`.
    async fn stats_by_period(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<LeaveStats>, RepositoryError>;

    /// The employee with the most leave records, or `None` when no leaves exist.
    async fn top_employee(&self) -> Result<Option<LeaveStats>, RepositoryError>;

    /// Stats for one username, matched case-insensitively.
    async fn stats_for_user(&self, username: &str) -> Result<Vec<LeaveStats>, RepositoryError>;
}

/// Sorts and de-duplicates a comma separated list of leave type names.
pub(crate) fn normalize_leave_types<'a>(types: impl IntoIterator<Item = &'a str>) -> String {
    let mut names: Vec<&str> =
        types.into_iter().map(str::trim).filter(|name| !name.is_empty()).collect();
    names.sort_unstable();
    names.dedup();
    names.join(", ")
}
