pub mod schema;
pub mod store;

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Synced,
}

impl SyncStatus {
    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        }
    }

    pub fn as_flag(self) -> i64 {
        match self {
            SyncStatus::Pending => 0,
            SyncStatus::Synced => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub seq: i64,
    pub subject_id: String,
    pub occurred_at: NaiveDateTime,
    pub event_type: i64,
    pub origin_node_id: String,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone)]
pub struct NewPunch {
    pub subject_id: String,
    pub occurred_at: NaiveDateTime,
    pub event_type: i64,
    pub origin_node_id: String,
}
