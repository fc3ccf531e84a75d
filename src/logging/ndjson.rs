use anyhow::Result;
use chrono::Utc;
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub fn mirror_cycle(path: &Path, component: &str, outcome: &str, detail: Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let line = json!({
        "ts": Utc::now().to_rfc3339(),
        "component": component,
        "outcome": outcome,
        "detail": detail
    });
    writeln!(f, "{}", line)?;
    Ok(())
}
