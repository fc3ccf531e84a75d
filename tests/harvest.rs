use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use waypost::config::{CaptureSourceConfig, SourceKind};
use waypost::events::store::EventStore;
use waypost::harvest::driver::{CaptureDriver, CaptureSession, HarvestError, RawPunch};
use waypost::harvest::{HarvestTarget, Harvester};

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn raw(subject: &str, ts: &str, event_type: i64) -> RawPunch {
    RawPunch {
        subject_id: subject.to_string(),
        occurred_at: at(ts),
        event_type,
    }
}

fn source(address: &str) -> CaptureSourceConfig {
    CaptureSourceConfig {
        address: address.to_string(),
        kind: SourceKind::Zkteco,
    }
}

#[derive(Default)]
struct FakeDriver {
    backlog: Arc<Mutex<Vec<RawPunch>>>,
    fail_connect: bool,
    fail_read: bool,
    closed: Arc<AtomicUsize>,
}

struct FakeSession {
    backlog: Vec<RawPunch>,
    fail_read: bool,
    closed: Arc<AtomicUsize>,
}

impl CaptureDriver for FakeDriver {
    fn connect(&self, address: &str) -> Result<Box<dyn CaptureSession>, HarvestError> {
        if self.fail_connect {
            return Err(HarvestError::Unreachable(address.to_string()));
        }
        Ok(Box::new(FakeSession {
            backlog: self.backlog.lock().unwrap().clone(),
            fail_read: self.fail_read,
            closed: Arc::clone(&self.closed),
        }))
    }
}

impl CaptureSession for FakeSession {
    fn read_events(&mut self) -> Result<Vec<RawPunch>, HarvestError> {
        if self.fail_read {
            return Err(HarvestError::Protocol("device reset mid-read".to_string()));
        }
        Ok(self.backlog.clone())
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn open_store() -> (tempfile::TempDir, Arc<EventStore>) {
    let tmp = tempdir().unwrap();
    let store = Arc::new(EventStore::open(&tmp.path().join("events.db")).unwrap());
    (tmp, store)
}

fn target(address: &str, driver: FakeDriver) -> HarvestTarget {
    HarvestTarget {
        config: source(address),
        driver: Some(Box::new(driver)),
    }
}

#[test]
fn overlapping_backlogs_insert_each_event_once() {
    let (_tmp, store) = open_store();
    let backlog = Arc::new(Mutex::new(vec![
        raw("u1", "2024-05-01 08:00:00", 0),
        raw("u2", "2024-05-01 08:05:00", 0),
    ]));
    let closed = Arc::new(AtomicUsize::new(0));
    let driver = FakeDriver {
        backlog: Arc::clone(&backlog),
        closed: Arc::clone(&closed),
        ..FakeDriver::default()
    };
    let mut harvester = Harvester::with_targets(
        Arc::clone(&store),
        "n1".to_string(),
        vec![target("10.0.0.5:4370", driver)],
    );

    let first = harvester.harvest_once();
    assert_eq!(first.records_seen, 2);
    assert_eq!(first.records_stored, 2);

    // The device always returns the full backlog; next pass overlaps entirely
    // with the previous one plus one fresh punch.
    backlog
        .lock()
        .unwrap()
        .push(raw("u1", "2024-05-01 17:00:00", 1));
    let second = harvester.harvest_once();
    assert_eq!(second.records_seen, 3);
    assert_eq!(second.records_stored, 1);

    assert_eq!(store.fetch_pending(None).unwrap().len(), 3);
    assert_eq!(closed.load(Ordering::SeqCst), 2);
}

#[test]
fn failing_source_does_not_block_the_rest() {
    let (_tmp, store) = open_store();
    let down = FakeDriver {
        fail_connect: true,
        ..FakeDriver::default()
    };
    let up = FakeDriver {
        backlog: Arc::new(Mutex::new(vec![
            raw("u1", "2024-05-01 08:00:00", 0),
            raw("u2", "2024-05-01 08:10:00", 0),
        ])),
        ..FakeDriver::default()
    };
    let mut harvester = Harvester::with_targets(
        Arc::clone(&store),
        "n1".to_string(),
        vec![target("10.0.0.5:4370", down), target("10.0.0.6:4370", up)],
    );

    let summary = harvester.harvest_once();
    assert_eq!(summary.sources_reached, 1);
    assert_eq!(summary.records_stored, 2);
    assert_eq!(store.fetch_pending(None).unwrap().len(), 2);
}

#[test]
fn session_is_closed_even_when_read_fails() {
    let (_tmp, store) = open_store();
    let closed = Arc::new(AtomicUsize::new(0));
    let driver = FakeDriver {
        fail_read: true,
        closed: Arc::clone(&closed),
        ..FakeDriver::default()
    };
    let mut harvester = Harvester::with_targets(
        store,
        "n1".to_string(),
        vec![target("10.0.0.5:4370", driver)],
    );

    let summary = harvester.harvest_once();
    assert_eq!(summary.sources_reached, 0);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn source_kind_without_driver_is_skipped() {
    let (_tmp, store) = open_store();
    let mut harvester = Harvester::with_targets(
        Arc::clone(&store),
        "n1".to_string(),
        vec![HarvestTarget {
            config: CaptureSourceConfig {
                address: "10.0.0.7:5010".to_string(),
                kind: SourceKind::Anviz,
            },
            driver: None,
        }],
    );

    let summary = harvester.harvest_once();
    assert_eq!(summary.sources_reached, 0);
    assert_eq!(summary.records_seen, 0);
    assert!(store.fetch_pending(None).unwrap().is_empty());
}

#[test]
fn stored_events_carry_the_configured_node_id() {
    let (_tmp, store) = open_store();
    let driver = FakeDriver {
        backlog: Arc::new(Mutex::new(vec![raw("u9", "2024-05-01 06:45:00", 1)])),
        ..FakeDriver::default()
    };
    let mut harvester = Harvester::with_targets(
        Arc::clone(&store),
        "pier-7".to_string(),
        vec![target("10.0.0.5:4370", driver)],
    );
    harvester.harvest_once();

    let pending = store.fetch_pending(None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].origin_node_id, "pier-7");
    assert_eq!(pending[0].subject_id, "u9");
    assert_eq!(pending[0].occurred_at, at("2024-05-01 06:45:00"));
}
