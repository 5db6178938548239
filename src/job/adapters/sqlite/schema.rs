//! Diesel schema for job persistence.

diesel::table! {
    /// Job records.
    jobs (id) {
        /// Hyphenated job UUID.
        id -> Text,
        /// Task description.
        task -> Text,
        /// Target repository path.
        repo -> Text,
        /// Job branch.
        branch -> Text,
        /// Explicit base branch.
        base_branch -> Nullable<Text>,
        /// Lifecycle status.
        status -> Text,
        /// Review-request URL.
        pr_url -> Nullable<Text>,
        /// Last failure message.
        error -> Nullable<Text>,
        /// JSON array of log entries.
        logs -> Text,
        /// RFC 3339 creation timestamp.
        created_at -> Text,
        /// RFC 3339 latest mutation timestamp.
        updated_at -> Text,
        /// Dry-run flag.
        dry_run -> Bool,
        /// Skip-tests flag.
        skip_tests -> Bool,
        /// Retries consumed.
        retry_count -> Integer,
        /// JSON array of skills.
        skills -> Text,
    }
}
