pub mod driver;
pub mod zkteco;

use crate::config::CaptureSourceConfig;
use crate::events::NewPunch;
use crate::events::store::EventStore;
use crate::harvest::driver::{CaptureDriver, HarvestError, driver_for};
use std::sync::Arc;
use tracing::{info, warn};

pub struct HarvestTarget {
    pub config: CaptureSourceConfig,
    pub driver: Option<Box<dyn CaptureDriver>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub sources_reached: usize,
    pub records_seen: usize,
    pub records_stored: usize,
}

pub struct Harvester {
    store: Arc<EventStore>,
    node_id: String,
    targets: Vec<HarvestTarget>,
}

impl Harvester {
    pub fn new(store: Arc<EventStore>, node_id: String, sources: &[CaptureSourceConfig]) -> Self {
        let targets = sources
            .iter()
            .map(|config| HarvestTarget {
                driver: driver_for(config.kind),
                config: config.clone(),
            })
            .collect();
        Self::with_targets(store, node_id, targets)
    }

    pub fn with_targets(store: Arc<EventStore>, node_id: String, targets: Vec<HarvestTarget>) -> Self {
        Self {
            store,
            node_id,
            targets,
        }
    }

    // One pass over every configured source. A failing source is reported and
    // skipped; it never blocks the remaining sources in the same pass.
    pub fn harvest_once(&mut self) -> HarvestSummary {
        let mut summary = HarvestSummary::default();
        for target in &mut self.targets {
            let Some(driver) = target.driver.as_deref() else {
                warn!(
                    target: "waypost::harvest",
                    address = %target.config.address,
                    kind = ?target.config.kind,
                    "no driver for source kind yet, skipping"
                );
                continue;
            };
            match harvest_source(&self.store, &self.node_id, driver, &target.config.address) {
                Ok((seen, stored)) => {
                    summary.sources_reached += 1;
                    summary.records_seen += seen;
                    summary.records_stored += stored;
                    info!(
                        target: "waypost::harvest",
                        address = %target.config.address,
                        seen,
                        stored,
                        "source drained"
                    );
                }
                Err(err) => {
                    warn!(
                        target: "waypost::harvest",
                        address = %target.config.address,
                        error = %err,
                        "source skipped this cycle"
                    );
                }
            }
        }
        summary
    }
}

fn harvest_source(
    store: &EventStore,
    node_id: &str,
    driver: &dyn CaptureDriver,
    address: &str,
) -> Result<(usize, usize), HarvestError> {
    let mut session = driver.connect(address)?;
    // The device holds the session open; close it whether or not the read worked.
    let result = session.read_events();
    session.close();
    let punches = result?;

    let seen = punches.len();
    let mut stored = 0;
    for punch in punches {
        let inserted = store.insert_if_absent(&NewPunch {
            subject_id: punch.subject_id,
            occurred_at: punch.occurred_at,
            event_type: punch.event_type,
            origin_node_id: node_id.to_string(),
        })?;
        if inserted {
            stored += 1;
        }
    }
    Ok((seen, stored))
}
