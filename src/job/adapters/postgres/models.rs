//! Diesel row models for job persistence.

use super::schema::jobs;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for job records.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct JobRow {
    /// Internal job identifier.
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub id: uuid::Uuid,
    /// Target repository.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub repository_id: String,
    /// Target file path.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub target_path: String,
    /// Requester identity.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub requester: String,
    /// Lifecycle status.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub status: String,
    /// Completion percentage.
    #[diesel(sql_type = diesel::sql_types::SmallInt)]
    pub progress: i16,
    /// Narrative text.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub log: String,
    /// Timestamp of the newest log entry.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Timestamptz>)]
    pub last_log_at: Option<DateTime<Utc>>,
    /// Working branch.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Varchar>)]
    pub branch_name: Option<String>,
    /// Pull request URL.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Varchar>)]
    pub pull_request_url: Option<String>,
    /// Baseline coverage in basis points.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::SmallInt>)]
    pub coverage_before: Option<i16>,
    /// Post-generation coverage in basis points.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::SmallInt>)]
    pub coverage_after: Option<i16>,
    /// Number of failed attempts.
    #[diesel(sql_type = diesel::sql_types::Integer)]
    pub attempt_count: i32,
    /// Start of the latest attempt.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Timestamptz>)]
    pub started_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub updated_at: DateTime<Utc>,
}

/// Insert and full-update model for job records.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = jobs)]
#[diesel(treat_none_as_null = true)]
pub struct NewJobRow {
    /// Internal job identifier.
    pub id: uuid::Uuid,
    /// Target repository.
    pub repository_id: String,
    /// Target file path.
    pub target_path: String,
    /// Requester identity.
    pub requester: String,
    /// Lifecycle status.
    pub status: String,
    /// Completion percentage.
    pub progress: i16,
    /// Narrative text.
    pub log: String,
    /// Timestamp of the newest log entry.
    pub last_log_at: Option<DateTime<Utc>>,
    /// Working branch.
    pub branch_name: Option<String>,
    /// Pull request URL.
    pub pull_request_url: Option<String>,
    /// Baseline coverage in basis points.
    pub coverage_before: Option<i16>,
    /// Post-generation coverage in basis points.
    pub coverage_after: Option<i16>,
    /// Number of failed attempts.
    pub attempt_count: i32,
    /// Start of the latest attempt.
    pub started_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
