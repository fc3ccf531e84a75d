use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:53";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Realtime,
    Intermittent,
    LocalFast,
}

impl Mode {
    pub fn default_intervals(self) -> Intervals {
        match self {
            Mode::Realtime => Intervals {
                harvest: Duration::from_secs(60),
                sync: Duration::from_secs(30),
            },
            Mode::Intermittent => Intervals {
                harvest: Duration::from_secs(60),
                sync: Duration::from_secs(900),
            },
            Mode::LocalFast => Intervals {
                harvest: Duration::from_secs(30),
                sync: Duration::from_secs(10),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Zkteco,
    Anviz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub harvest: Duration,
    pub sync: Duration,
}

#[derive(Debug, Clone)]
pub struct CaptureSourceConfig {
    pub address: String,
    pub kind: SourceKind,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub node_id: Option<String>,
    pub state_db: Option<PathBuf>,
    pub endpoint: String,
    pub token: Option<String>,
    pub probe_addr: String,
    pub sources: Vec<CaptureSourceConfig>,
    pub intervals: Intervals,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    mode: Option<Mode>,
    node_id: Option<String>,
    state_db: Option<String>,
    sync: Option<RawSyncConfig>,
    sources: Option<Vec<RawSourceConfig>>,
    intervals: Option<RawIntervals>,
}

#[derive(Debug, Deserialize)]
struct RawSyncConfig {
    endpoint: Option<String>,
    token: Option<String>,
    probe_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSourceConfig {
    address: Option<String>,
    kind: Option<SourceKind>,
}

#[derive(Debug, Deserialize)]
struct RawIntervals {
    harvest: Option<u64>,
    sync: Option<u64>,
}

pub fn load(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let parsed: RawConfig =
        toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    validate(parsed, path)
}

fn validate(raw: RawConfig, path: &Path) -> Result<Config> {
    let mode = raw.mode.unwrap_or(Mode::Realtime);

    let node_id = match raw.node_id {
        Some(id) => {
            let id = id.trim().to_string();
            if id.is_empty() {
                bail!("{} has empty `node_id`", path.display());
            }
            Some(id)
        }
        None => None,
    };

    let sync = raw
        .sync
        .ok_or_else(|| anyhow::anyhow!("{} missing `[sync]` section", path.display()))?;
    let endpoint = sync
        .endpoint
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} missing `[sync].endpoint`", path.display()))?;
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        bail!(
            "{} has invalid `[sync].endpoint` `{endpoint}`; expected an http(s) URL",
            path.display()
        );
    }
    let token = sync
        .token
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let probe_addr = sync
        .probe_addr
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string());
    validate_host_port(&probe_addr)
        .with_context(|| format!("{} invalid `[sync].probe_addr`", path.display()))?;

    let mut sources = Vec::new();
    for (idx, source) in raw.sources.unwrap_or_default().into_iter().enumerate() {
        let address = source
            .address
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "{} missing `address` for `[[sources]]` at index {idx}",
                    path.display()
                )
            })?;
        validate_host_port(&address).with_context(|| {
            format!(
                "{} invalid `address` for `[[sources]]` at index {idx}",
                path.display()
            )
        })?;
        let kind = source.kind.ok_or_else(|| {
            anyhow::anyhow!(
                "{} missing `kind` for `[[sources]]` at index {idx}",
                path.display()
            )
        })?;
        sources.push(CaptureSourceConfig { address, kind });
    }

    let defaults = mode.default_intervals();
    let intervals = match raw.intervals {
        Some(overrides) => {
            if overrides.harvest == Some(0) || overrides.sync == Some(0) {
                bail!("{} has zero `[intervals]` entry", path.display());
            }
            Intervals {
                harvest: overrides
                    .harvest
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.harvest),
                sync: overrides
                    .sync
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.sync),
            }
        }
        None => defaults,
    };

    Ok(Config {
        mode,
        node_id,
        state_db: raw.state_db.map(PathBuf::from),
        endpoint,
        token,
        probe_addr,
        sources,
        intervals,
    })
}

fn validate_host_port(addr: &str) -> Result<()> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        bail!("`{addr}` is missing a `:port` suffix");
    };
    if host.is_empty() {
        bail!("`{addr}` has an empty host");
    }
    let port: u16 = port
        .parse()
        .with_context(|| format!("`{addr}` has a non-numeric port"))?;
    if port == 0 {
        bail!("`{addr}` has port 0");
    }
    Ok(())
}
