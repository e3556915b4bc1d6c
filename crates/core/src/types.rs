/// Participants are identified by opaque UUIDs.
pub type ParticipantId = uuid::Uuid;

/// Groups are identified by opaque UUIDs.
pub type GroupId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
