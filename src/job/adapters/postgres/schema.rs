//! Diesel schema for job persistence.

diesel::table! {
    /// Job records including lifecycle, narrative, and linkage columns.
    jobs (id) {
        /// Internal job identifier.
        id -> Uuid,
        /// Target repository in `owner/name` form.
        #[max_length = 255]
        repository_id -> Varchar,
        /// Target file path relative to the repository root.
        #[max_length = 1024]
        target_path -> Varchar,
        /// Requester identity.
        #[max_length = 255]
        requester -> Varchar,
        /// Lifecycle status.
        #[max_length = 20]
        status -> Varchar,
        /// Completion percentage.
        progress -> Int2,
        /// Append-only narrative text.
        log -> Text,
        /// Timestamp of the newest log entry.
        last_log_at -> Nullable<Timestamptz>,
        /// Working branch, once assigned.
        #[max_length = 255]
        branch_name -> Nullable<Varchar>,
        /// Pull request URL, once recorded.
        #[max_length = 2048]
        pull_request_url -> Nullable<Varchar>,
        /// Baseline coverage in basis points.
        coverage_before -> Nullable<Int2>,
        /// Post-generation coverage in basis points.
        coverage_after -> Nullable<Int2>,
        /// Number of failed attempts.
        attempt_count -> Int4,
        /// Start of the latest attempt.
        started_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}
