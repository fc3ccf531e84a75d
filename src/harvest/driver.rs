use crate::config::SourceKind;
use crate::events::store::StoreError;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("source unreachable: {0}")]
    Unreachable(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPunch {
    pub subject_id: String,
    pub occurred_at: NaiveDateTime,
    pub event_type: i64,
}

pub trait CaptureSession {
    fn read_events(&mut self) -> Result<Vec<RawPunch>, HarvestError>;
    fn close(&mut self);
}

pub trait CaptureDriver: Send {
    fn connect(&self, address: &str) -> Result<Box<dyn CaptureSession>, HarvestError>;
}

pub fn driver_for(kind: SourceKind) -> Option<Box<dyn CaptureDriver>> {
    match kind {
        SourceKind::Zkteco => Some(Box::new(crate::harvest::zkteco::ZkTecoDriver::new())),
        SourceKind::Anviz => None,
    }
}
