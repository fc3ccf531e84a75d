use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::tempdir;
use waypost::events::NewPunch;
use waypost::events::store::EventStore;
use waypost::runtime::{self, RunOptions};

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn read_request(stream: &mut TcpStream) -> (HashMap<String, String>, Vec<u8>) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).unwrap();
        if n == 0 {
            break;
        }
        head.push(byte[0]);
    }
    let head_text = String::from_utf8_lossy(&head).to_string();
    let mut headers = HashMap::new();
    for line in head_text.lines().skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    let len: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).unwrap();
    (headers, body)
}

fn serve(statuses: Vec<u16>) -> (String, Arc<Mutex<Vec<Vec<u8>>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&bodies);
    thread::spawn(move || {
        for status in statuses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let (_headers, body) = read_request(&mut stream);
            sink.lock().unwrap().push(body);
            let reason = if status == 200 { "OK" } else { "Error" };
            let response =
                format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            let _ = stream.write_all(response.as_bytes());
        }
    });
    (format!("http://{addr}/ingest/punches"), bodies)
}

fn write_config(dir: &Path, endpoint: &str, db: &Path) -> std::path::PathBuf {
    let path = dir.join("waypost.toml");
    std::fs::write(
        &path,
        format!(
            r#"
mode = "realtime"
node_id = "e2e-node"
state_db = "{}"

[sync]
endpoint = "{endpoint}"
"#,
            db.display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn once_pass_uploads_previously_buffered_events() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("events.db");
    {
        let store = EventStore::open(&db).unwrap();
        for (ts, event_type) in [("2024-05-01 08:00:00", 0), ("2024-05-01 17:01:00", 1)] {
            store
                .insert_if_absent(&NewPunch {
                    subject_id: "u1".to_string(),
                    occurred_at: at(ts),
                    event_type,
                    origin_node_id: "e2e-node".to_string(),
                })
                .unwrap();
        }
    }

    let (endpoint, bodies) = serve(vec![200]);
    let config = write_config(tmp.path(), &endpoint, &db);
    let log = tmp.path().join("cycles.ndjson");

    runtime::execute(RunOptions {
        config,
        once: true,
        log: Some(log.clone()),
        state_db: None,
    })
    .unwrap();

    let store = EventStore::open(&db).unwrap();
    assert_eq!(store.status_counts().unwrap(), (0, 2));

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let records: serde_json::Value = serde_json::from_slice(&bodies[0]).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 2);

    let mirrored = std::fs::read_to_string(&log).unwrap();
    assert!(mirrored.contains("\"component\":\"harvest\""));
    assert!(mirrored.contains("\"outcome\":\"uploaded\""));
}

#[test]
fn once_pass_surfaces_a_rejected_upload() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("events.db");
    {
        let store = EventStore::open(&db).unwrap();
        store
            .insert_if_absent(&NewPunch {
                subject_id: "u1".to_string(),
                occurred_at: at("2024-05-01 08:00:00"),
                event_type: 0,
                origin_node_id: "e2e-node".to_string(),
            })
            .unwrap();
    }

    let (endpoint, _bodies) = serve(vec![500]);
    let config = write_config(tmp.path(), &endpoint, &db);

    let err = runtime::execute(RunOptions {
        config,
        once: true,
        log: None,
        state_db: None,
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("status 500"));

    let store = EventStore::open(&db).unwrap();
    assert_eq!(store.status_counts().unwrap(), (1, 0));
}

#[test]
fn startup_fails_fast_without_an_endpoint() {
    let tmp = tempdir().unwrap();
    let config = tmp.path().join("waypost.toml");
    std::fs::write(&config, "mode = \"realtime\"\n").unwrap();

    let err = runtime::execute(RunOptions {
        config,
        once: true,
        log: None,
        state_db: None,
    })
    .unwrap_err();
    assert!(format!("{err}").contains("missing `[sync]`"));
}
