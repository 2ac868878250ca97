use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use attendly_core::domain::leave::{Leave, LeaveId, LeaveType, NewLeave};
use attendly_core::domain::query::LeaveStats;

use super::{normalize_leave_types, LeaveRepository, RepositoryError};
use crate::DbPool;

const STATS_COLUMNS: &str = "SELECT
        username,
        COUNT(*) AS leave_count,
        GROUP_CONCAT(DISTINCT leave_type) AS leave_types,
        COALESCE(SUM(CAST(strftime('%s', end_time) AS INTEGER)
            - CAST(strftime('%s', start_time) AS INTEGER)), 0) AS total_seconds
     FROM leaves";

/// One row per spelling-insensitive username, shown under its smallest spelling.
const USER_STATS: &str = "SELECT
        MIN(username) AS username,
        COUNT(*) AS leave_count,
        GROUP_CONCAT(DISTINCT leave_type) AS leave_types,
        COALESCE(SUM(CAST(strftime('%s', end_time) AS INTEGER)
            - CAST(strftime('%s', start_time) AS INTEGER)), 0) AS total_seconds
     FROM leaves
     WHERE username = ? COLLATE NOCASE
     GROUP BY lower(username)";

const STATS_ORDER: &str = "GROUP BY username
     ORDER BY leave_count DESC, username ASC";

pub struct SqlLeaveRepository {
    pool: DbPool,
}

impl SqlLeaveRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeaveRepository for SqlLeaveRepository {
    async fn create(&self, leave: NewLeave) -> Result<LeaveId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO leaves (
                username,
                original_text,
                start_time,
                end_time,
                duration,
                reason,
                leave_type
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&leave.username)
        .bind(&leave.original_text)
        .bind(storage_timestamp(leave.start_time))
        .bind(storage_timestamp(leave.end_time))
        .bind(&leave.duration_label)
        .bind(&leave.reason)
        .bind(leave.leave_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(LeaveId(result.last_insert_rowid()))
    }

    async fn find_by_id(&self, id: LeaveId) -> Result<Option<Leave>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                username,
                original_text,
                start_time,
                end_time,
                duration,
                reason,
                leave_type,
                created_at,
                updated_at
             FROM leaves
             WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(leave_from_row).transpose()
    }

    async fn stats_by_period(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<LeaveStats>, RepositoryError> {
        let sql = format!("{STATS_COLUMNS}\n     WHERE start_time >= ? AND start_time < ?\n     {STATS_ORDER}");
        let rows = sqlx::query(&sql)
            .bind(storage_timestamp(from))
            .bind(storage_timestamp(until))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(stats_from_row).collect()
    }

    async fn top_employee(&self) -> Result<Option<LeaveStats>, RepositoryError> {
        let sql = format!("{STATS_COLUMNS}\n     {STATS_ORDER}\n     LIMIT 1");
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;

        row.map(stats_from_row).transpose()
    }

    async fn stats_for_user(&self, username: &str) -> Result<Vec<LeaveStats>, RepositoryError> {
        let rows = sqlx::query(USER_STATS).bind(username.trim()).fetch_all(&self.pool).await?;

        rows.into_iter().map(stats_from_row).collect()
    }
}

/// Fixed-width UTC text (`2024-03-11T03:30:00Z`) so string order is time order.
fn storage_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn leave_from_row(row: SqliteRow) -> Result<Leave, RepositoryError> {
    let leave_type_raw = row.try_get::<String, _>("leave_type")?;
    let leave_type = leave_type_raw
        .parse::<LeaveType>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Leave {
        id: LeaveId(row.try_get("id")?),
        username: row.try_get("username")?,
        original_text: row.try_get("original_text")?,
        start_time: parse_timestamp("start_time", row.try_get("start_time")?)?,
        end_time: parse_timestamp("end_time", row.try_get("end_time")?)?,
        duration_label: row.try_get("duration")?,
        reason: row.try_get("reason")?,
        leave_type,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn stats_from_row(row: SqliteRow) -> Result<LeaveStats, RepositoryError> {
    let leave_types: Option<String> = row.try_get("leave_types")?;
    let total_seconds: i64 = row.try_get("total_seconds")?;

    Ok(LeaveStats {
        username: row.try_get("username")?,
        leave_count: row.try_get("leave_count")?,
        leave_types: normalize_leave_types(leave_types.as_deref().unwrap_or_default().split(',')),
        total_hours: total_seconds as f64 / 3600.0,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
