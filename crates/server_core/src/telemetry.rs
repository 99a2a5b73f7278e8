//! Telemetry bootstrap for the embedding server.
//!
//! Library code logs through the `log` facade; the server calls
//! [`init_telemetry`] once at startup to install the tracing subscriber,
//! the log bridge, and (when configured) a Prometheus exporter. Settings
//! come from `data/config/telemetry.toml`; environment variables win over
//! the file.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryCfg {
    pub log_level: Option<String>,
    pub json_logs: Option<bool>,
    pub metrics_addr: Option<String>,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            json_logs: Some(true),
            metrics_addr: None,
        }
    }
}

impl TelemetryCfg {
    /// Settings from the config file, falling back to defaults when the
    /// file is absent, then overridden from the environment.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("parse {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Self::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", path.display()));
            }
        };
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log_level = Some(level);
        }
        if let Ok(addr) = std::env::var("METRICS_ADDR") {
            self.metrics_addr = Some(addr);
        }
        if let Ok(json) = std::env::var("JSON_LOGS") {
            self.json_logs = json.parse().ok().or(self.json_logs);
        }
    }
}

fn config_path() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // Workspace checkout first, crate-local data second.
    for root in [manifest.join("../.."), manifest.to_path_buf()] {
        let candidate = root.join("data/config/telemetry.toml");
        if candidate.is_file() {
            return candidate;
        }
    }
    manifest.join("data/config/telemetry.toml")
}

pub struct TelemetryGuard;

pub fn init_telemetry(cfg: &TelemetryCfg) -> Result<TelemetryGuard> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    tracing_log::LogTracer::init().context("install log bridge")?;

    let directives = cfg.log_level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_new(directives)
        .with_context(|| format!("bad log filter {directives:?}"))?;
    let base = tracing_subscriber::registry().with(filter);
    if cfg.json_logs.unwrap_or(true) {
        base.with(fmt::layer().json()).init();
    } else {
        base.with(fmt::layer().compact()).init();
    }

    if let Some(addr) = cfg.metrics_addr.as_deref() {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("bad metrics_addr {addr:?}"))?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("start metrics exporter")?;
    }
    Ok(TelemetryGuard)
}
