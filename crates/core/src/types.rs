/// Jobs are identified by an opaque random UUID handed back to the uploader.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
