use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::{EngineConfig, DEFAULT_SEARCH_DAYS};

/// Server settings read from `HALLBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// `false` runs without a WAL; state is lost on exit.
    pub persist: bool,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
    pub suggest_window_days: i64,
    pub utilization_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            persist: true,
            max_connections: 256,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            metrics_port: None,
            suggest_window_days: DEFAULT_SEARCH_DAYS,
            utilization_days: 30,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        let d = Self::default();
        Self {
            bind: lookup("HALLBOOK_BIND").unwrap_or(d.bind),
            port: parsed(&lookup, "HALLBOOK_PORT").unwrap_or(d.port),
            data_dir: lookup("HALLBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            persist: lookup("HALLBOOK_PERSIST")
                .map(|s| !matches!(s.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(d.persist),
            max_connections: parsed(&lookup, "HALLBOOK_MAX_CONNECTIONS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(d.max_connections),
            compact_threshold: parsed(&lookup, "HALLBOOK_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            compact_interval: parsed(&lookup, "HALLBOOK_COMPACT_INTERVAL_SECS")
                .filter(|&s: &u64| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(d.compact_interval),
            metrics_port: parsed(&lookup, "HALLBOOK_METRICS_PORT"),
            suggest_window_days: parsed(&lookup, "HALLBOOK_SUGGEST_WINDOW_DAYS")
                .filter(|&n: &i64| n >= 0)
                .unwrap_or(d.suggest_window_days),
            utilization_days: parsed(&lookup, "HALLBOOK_UTILIZATION_DAYS")
                .filter(|&n: &i64| n > 0)
                .unwrap_or(d.utilization_days),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("hallbook.wal")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            wal_path: self.persist.then(|| self.wal_path()),
            search_before_days: self.suggest_window_days,
            search_after_days: self.suggest_window_days,
            utilization_days: self.utilization_days,
            ..EngineConfig::default()
        }
    }
}
