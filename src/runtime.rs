use crate::config::{self, Config};
use crate::events::store::EventStore;
use crate::harvest::{Harvester, HarvestSummary};
use crate::logging::ndjson;
use crate::sync::policy::policy_for;
use crate::sync::{SyncError, SyncOutcome, Syncer};
use anyhow::{Context, Result};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub once: bool,
    pub log: Option<PathBuf>,
    pub state_db: Option<PathBuf>,
}

pub fn execute(opts: RunOptions) -> Result<()> {
    let cfg = config::load(&opts.config)?;
    let db_path = opts
        .state_db
        .or_else(|| cfg.state_db.clone())
        .unwrap_or_else(default_state_db);
    let store = Arc::new(EventStore::open(&db_path)?);
    let node_id = resolve_node_id(&cfg, &db_path)?;

    if cfg.sources.is_empty() {
        warn!(target: "waypost", "no capture sources configured; nothing will be harvested");
    }

    let harvester = Harvester::new(Arc::clone(&store), node_id.clone(), &cfg.sources);
    let syncer = Syncer::new(
        store,
        cfg.endpoint.clone(),
        cfg.token.clone(),
        cfg.probe_addr.clone(),
        policy_for(cfg.mode),
    )?;

    info!(
        target: "waypost",
        mode = ?cfg.mode,
        node_id = %node_id,
        db = %db_path.display(),
        endpoint = %cfg.endpoint,
        "gateway starting"
    );

    if opts.once {
        run_once(harvester, &syncer, opts.log.as_deref())
    } else {
        run_forever(harvester, syncer, &cfg, opts.log)
    }
}

pub fn show_status(config_path: &Path, state_db: Option<PathBuf>) -> Result<()> {
    let cfg = config::load(config_path)?;
    let db_path = state_db
        .or(cfg.state_db)
        .unwrap_or_else(default_state_db);
    let store = EventStore::open(&db_path)?;
    let (pending, synced) = store.status_counts()?;
    println!(
        "{}: {pending} pending, {synced} synced",
        db_path.display()
    );
    Ok(())
}

fn run_once(mut harvester: Harvester, syncer: &Syncer, log: Option<&Path>) -> Result<()> {
    let summary = harvester.harvest_once();
    report_harvest(&summary, log);
    let result = syncer.sync_once();
    report_sync(&result, log);
    result.context("sync pass failed")?;
    Ok(())
}

// Two independent loops for the life of the process. A failed cycle is
// reported and the loop sleeps until the next one; neither loop ever waits
// on the other.
fn run_forever(
    mut harvester: Harvester,
    syncer: Syncer,
    cfg: &Config,
    log: Option<PathBuf>,
) -> Result<()> {
    let intervals = cfg.intervals;

    let harvest_log = log.clone();
    let harvest_handle = thread::Builder::new()
        .name("harvest".to_string())
        .spawn(move || {
            loop {
                let summary = harvester.harvest_once();
                report_harvest(&summary, harvest_log.as_deref());
                thread::sleep(intervals.harvest);
            }
        })
        .context("spawn harvest loop")?;

    let sync_handle = thread::Builder::new()
        .name("sync".to_string())
        .spawn(move || {
            loop {
                let result = syncer.sync_once();
                report_sync(&result, log.as_deref());
                thread::sleep(intervals.sync);
            }
        })
        .context("spawn sync loop")?;

    for handle in [harvest_handle, sync_handle] {
        if handle.join().is_err() {
            error!(target: "waypost", "scheduler thread panicked");
        }
    }
    Ok(())
}

fn report_harvest(summary: &HarvestSummary, log: Option<&Path>) {
    info!(
        target: "waypost::harvest",
        sources = summary.sources_reached,
        seen = summary.records_seen,
        stored = summary.records_stored,
        "harvest cycle complete"
    );
    mirror(
        log,
        "harvest",
        "complete",
        json!({
            "sources": summary.sources_reached,
            "seen": summary.records_seen,
            "stored": summary.records_stored
        }),
    );
}

fn report_sync(result: &Result<SyncOutcome, SyncError>, log: Option<&Path>) {
    match result {
        Ok(SyncOutcome::Uploaded(count)) => {
            info!(target: "waypost::sync", uploaded = count, "batch acknowledged");
            mirror(log, "sync", "uploaded", json!({ "uploaded": count }));
        }
        Ok(SyncOutcome::Idle) => {
            debug!(target: "waypost::sync", "nothing pending");
            mirror(log, "sync", "idle", json!({}));
        }
        Ok(SyncOutcome::Offline) => {
            info!(target: "waypost::sync", "connectivity precheck failed, deferring upload");
            mirror(log, "sync", "offline", json!({}));
        }
        Err(err) => {
            error!(target: "waypost::sync", error = %err, "sync attempt failed");
            mirror(log, "sync", "error", json!({ "error": err.to_string() }));
        }
    }
}

fn mirror(log: Option<&Path>, component: &str, outcome: &str, detail: serde_json::Value) {
    if let Some(path) = log
        && let Err(err) = ndjson::mirror_cycle(path, component, outcome, detail)
    {
        error!(target: "waypost", error = %err, "failed to append ndjson log");
    }
}

fn default_state_db() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("waypost").join("events.db");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("waypost")
            .join("events.db");
    }
    PathBuf::from(".waypost/events.db")
}

// The origin node id disambiguates identical punches across installations, so
// a generated id has to survive restarts: persist it beside the database.
fn resolve_node_id(cfg: &Config, db_path: &Path) -> Result<String> {
    if let Some(id) = &cfg.node_id {
        return Ok(id.clone());
    }
    let path = db_path
        .parent()
        .map(|parent| parent.join("node_id"))
        .unwrap_or_else(|| PathBuf::from("node_id"));
    if path.exists() {
        let id = fs::read_to_string(&path)
            .with_context(|| format!("read node id {}", path.display()))?;
        let id = id.trim().to_string();
        if !id.is_empty() {
            return Ok(id);
        }
    }
    let id = uuid::Uuid::new_v4().to_string();
    fs::write(&path, &id).with_context(|| format!("write node id {}", path.display()))?;
    info!(target: "waypost", node_id = %id, "generated node identity");
    Ok(id)
}
