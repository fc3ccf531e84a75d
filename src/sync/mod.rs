pub mod policy;
pub mod probe;

use crate::events::EventRecord;
use crate::events::store::{EventStore, StoreError};
use crate::sync::policy::SyncPolicy;
use chrono::NaiveDateTime;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote endpoint rejected upload: status {status}")]
    Upload { status: u16 },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payload serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("payload compression error: {0}")]
    Compress(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Idle,
    Offline,
    Uploaded(usize),
}

#[derive(Serialize)]
struct WirePunch<'a> {
    id: i64,
    subject_id: &'a str,
    occurred_at: NaiveDateTime,
    event_type: i64,
    origin_node_id: &'a str,
}

pub struct Syncer {
    store: Arc<EventStore>,
    client: Client,
    endpoint: String,
    token: Option<String>,
    probe_addr: String,
    policy: SyncPolicy,
}

impl Syncer {
    pub fn new(
        store: Arc<EventStore>,
        endpoint: String,
        token: Option<String>,
        probe_addr: String,
        policy: SyncPolicy,
    ) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(policy.upload_timeout).build()?;
        Ok(Self {
            store,
            client,
            endpoint,
            token,
            probe_addr,
            policy,
        })
    }

    // One sync attempt. Events are marked synced strictly after the endpoint
    // acknowledged the batch with 200; every failure path leaves the whole
    // batch pending for the next cycle.
    pub fn sync_once(&self) -> Result<SyncOutcome, SyncError> {
        if self.policy.precheck && !probe::is_reachable(&self.probe_addr, PROBE_TIMEOUT) {
            return Ok(SyncOutcome::Offline);
        }

        let batch = self.store.fetch_pending(self.policy.batch_limit)?;
        if batch.is_empty() {
            return Ok(SyncOutcome::Idle);
        }

        self.upload(&batch)?;

        let seqs: Vec<i64> = batch.iter().map(|event| event.seq).collect();
        self.store.mark_synced(&seqs)?;
        Ok(SyncOutcome::Uploaded(seqs.len()))
    }

    fn upload(&self, batch: &[EventRecord]) -> Result<(), SyncError> {
        let records: Vec<WirePunch<'_>> = batch
            .iter()
            .map(|event| WirePunch {
                id: event.seq,
                subject_id: &event.subject_id,
                occurred_at: event.occurred_at,
                event_type: event.event_type,
                origin_node_id: &event.origin_node_id,
            })
            .collect();

        let mut request = self.client.post(&self.endpoint);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = if self.policy.compress {
            let body = serde_json::to_vec(&records)?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            request
                .header(CONTENT_ENCODING, "gzip")
                .header(CONTENT_TYPE, "application/json")
                .body(encoder.finish()?)
        } else {
            request.json(&records)
        };

        let response = request.send()?;
        if response.status() != StatusCode::OK {
            return Err(SyncError::Upload {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
