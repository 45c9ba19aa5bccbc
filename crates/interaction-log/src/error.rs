// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while loading configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid run mode: {0}")]
    InvalidMode(String),

    #[error("Invalid listen address {0}: {1}")]
    InvalidAddress(String, std::net::AddrParseError),
}

/// Errors raised by the append-only log files
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize logs: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Write task failed: {0}")]
    Task(String),
}

/// Errors raised while binding a request body to a log envelope
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Error reading request body: {0}")]
    Body(Box<dyn std::error::Error + Send + Sync>),

    #[error("Error deserializing request body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the analyzer. All of them abort the analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode {}{}: {source}", .path.display(), line_suffix(.line))]
    Decode {
        path: PathBuf,
        line: Option<usize>,
        source: serde_json::Error,
    },
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}
