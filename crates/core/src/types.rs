/// Chat users are identified by the transport's numeric id.
pub type UserId = i64;

/// Identifier assigned to every job at admission, used for log correlation.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
