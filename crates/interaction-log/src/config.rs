// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOGS_PATH: &str = "logs.jsonl";
const DEFAULT_LOCAL_STORAGE_LOGS_PATH: &str = "localStorageLogs.jsonl";
const DEFAULT_LOCAL_STORAGE_PATH: &str = "localStorage.json";
const DEFAULT_MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024; // 10MB in Bytes

/// Which component the process runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Serve the ingestion endpoints until terminated
    #[default]
    Server,
    /// Count the stored logs once, print the tally and exit
    Analyze,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "server" => Ok(Mode::Server),
            "analyze" => Ok(Mode::Analyze),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Server => write!(f, "server"),
            Mode::Analyze => write!(f, "analyze"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    pub listen_addr: SocketAddr,
    /// receives single log submissions, one JSON object per line
    pub logs_path: PathBuf,
    /// receives batch submissions, one JSON array per line
    pub local_storage_logs_path: PathBuf,
    /// whole-document JSON array, only read by the analyzer
    pub local_storage_path: PathBuf,
    pub max_request_content_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: Mode::Server,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            logs_path: PathBuf::from(DEFAULT_LOGS_PATH),
            local_storage_logs_path: PathBuf::from(DEFAULT_LOCAL_STORAGE_LOGS_PATH),
            local_storage_path: PathBuf::from(DEFAULT_LOCAL_STORAGE_PATH),
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
        }
    }
}

impl Config {
    pub fn new() -> Result<Config, ConfigError> {
        let mode = env::var("ILOG_MODE")
            .map(|val| val.parse::<Mode>())
            .unwrap_or(Ok(Mode::default()))?;

        let host = env::var("ILOG_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let ip = host
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidAddress(host.clone(), e))?;
        let port: u16 = env::var("ILOG_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let max_request_content_length = env::var("ILOG_MAX_REQUEST_CONTENT_LENGTH")
            .ok()
            .and_then(|len| len.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_REQUEST_CONTENT_LENGTH);

        Ok(Config {
            mode,
            listen_addr: SocketAddr::new(ip, port),
            logs_path: path_from_env("ILOG_LOGS_PATH", DEFAULT_LOGS_PATH),
            local_storage_logs_path: path_from_env(
                "ILOG_LOCAL_STORAGE_LOGS_PATH",
                DEFAULT_LOCAL_STORAGE_LOGS_PATH,
            ),
            local_storage_path: path_from_env(
                "ILOG_LOCAL_STORAGE_PATH",
                DEFAULT_LOCAL_STORAGE_PATH,
            ),
            max_request_content_length,
        })
    }
}

fn path_from_env(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|val| !val.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
