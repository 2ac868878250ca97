use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::RwLock;

use attendly_core::domain::leave::{Leave, LeaveId, NewLeave};
use attendly_core::domain::query::LeaveStats;

use super::{normalize_leave_types, LeaveRepository, RepositoryError};

/// Leave store for tests and dry runs; mirrors the SQL grouping and ordering.
#[derive(Default)]
pub struct InMemoryLeaveRepository {
    leaves: RwLock<Vec<Leave>>,
}

impl InMemoryLeaveRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Leave> {
        self.leaves.read().await.clone()
    }
}

#[async_trait::async_trait]
impl LeaveRepository for InMemoryLeaveRepository {
    async fn create(&self, leave: NewLeave) -> Result<LeaveId, RepositoryError> {
        if leave.start_time >= leave.end_time {
            return Err(RepositoryError::Decode(
                "leave start_time must be before end_time".to_string(),
            ));
        }

        let mut leaves = self.leaves.write().await;
        let id = LeaveId(leaves.len() as i64 + 1);
        let now = Utc::now().trunc_subsecs(0);
        leaves.push(Leave {
            id,
            username: leave.username,
            original_text: leave.original_text,
            start_time: leave.start_time,
            end_time: leave.end_time,
            duration_label: leave.duration_label,
            reason: leave.reason,
            leave_type: leave.leave_type,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn find_by_id(&self, id: LeaveId) -> Result<Option<Leave>, RepositoryError> {
        let leaves = self.leaves.read().await;
        Ok(leaves.iter().find(|leave| leave.id == id).cloned())
    }

    async fn stats_by_period(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<LeaveStats>, RepositoryError> {
        let leaves = self.leaves.read().await;
        Ok(aggregate(
            leaves.iter().filter(|leave| leave.start_time >= from && leave.start_time < until),
        ))
    }

    async fn top_employee(&self) -> Result<Option<LeaveStats>, RepositoryError> {
        let leaves = self.leaves.read().await;
        Ok(aggregate(leaves.iter()).into_iter().next())
    }

    async fn stats_for_user(&self, username: &str) -> Result<Vec<LeaveStats>, RepositoryError> {
        let username = username.trim();
        let leaves = self.leaves.read().await;
        let matching: Vec<&Leave> =
            leaves.iter().filter(|leave| leave.username.eq_ignore_ascii_case(username)).collect();
        let Some(display_name) = matching.iter().map(|leave| leave.username.as_str()).min() else {
            return Ok(Vec::new());
        };
        Ok(vec![group_stats(display_name, &matching)])
    }
}

fn aggregate<'a>(leaves: impl Iterator<Item = &'a Leave>) -> Vec<LeaveStats> {
    let mut groups: BTreeMap<&str, Vec<&Leave>> = BTreeMap::new();
    for leave in leaves {
        groups.entry(leave.username.as_str()).or_default().push(leave);
    }

    let mut stats: Vec<LeaveStats> =
        groups.into_iter().map(|(username, group)| group_stats(username, &group)).collect();

    stats.sort_by(|left, right| {
        right.leave_count.cmp(&left.leave_count).then_with(|| left.username.cmp(&right.username))
    });
    stats
}

fn group_stats(username: &str, group: &[&Leave]) -> LeaveStats {
    let total_seconds: i64 =
        group.iter().map(|leave| (leave.end_time - leave.start_time).num_seconds()).sum();
    LeaveStats {
        username: username.to_string(),
        leave_count: group.len() as i64,
        leave_types: normalize_leave_types(group.iter().map(|leave| leave.leave_type.as_str())),
        total_hours: total_seconds as f64 / 3600.0,
    }
}
