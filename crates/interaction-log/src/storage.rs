// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::StorageError;
use crate::model::LogRecord;

#[async_trait]
pub trait LogSink {
    /// Appends one record as a single JSON object line.
    async fn append_log(&self, log: &LogRecord) -> Result<(), StorageError>;
    /// Appends a whole batch as a single JSON array line.
    async fn append_batch(&self, logs: &[LogRecord]) -> Result<(), StorageError>;
}

/// A file opened once in append mode and only ever written at its end.
#[derive(Debug)]
pub struct AppendOnlyFile {
    path: PathBuf,
    file: File,
}

impl AppendOnlyFile {
    /// Opens `path` for appending, creating it if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(&path).map_err(|source| StorageError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(AppendOnlyFile { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes `value` and writes it followed by a newline in a single write.
    ///
    /// Appends from concurrent requests are not coordinated.
    pub fn append_json_line<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        (&self.file)
            .write_all(&line)
            .map_err(|source| StorageError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// The two append-only files written by the ingestion endpoints.
///
/// Both files are opened when the store is created and closed when it is dropped.
#[derive(Debug)]
pub struct FileLogStore {
    logs: Arc<AppendOnlyFile>,
    local_storage_logs: Arc<AppendOnlyFile>,
}

impl FileLogStore {
    pub fn open(
        logs_path: impl AsRef<Path>,
        local_storage_logs_path: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        let logs = AppendOnlyFile::open(logs_path)?;
        let local_storage_logs = AppendOnlyFile::open(local_storage_logs_path)?;
        debug!(
            "Opened log files {} and {}",
            logs.path().display(),
            local_storage_logs.path().display()
        );
        Ok(FileLogStore {
            logs: Arc::new(logs),
            local_storage_logs: Arc::new(local_storage_logs),
        })
    }

    async fn append<T>(file: &Arc<AppendOnlyFile>, value: T) -> Result<(), StorageError>
    where
        T: Serialize + Send + 'static,
    {
        let file = Arc::clone(file);
        tokio::task::spawn_blocking(move || file.append_json_line(&value))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

#[async_trait]
impl LogSink for FileLogStore {
    async fn append_log(&self, log: &LogRecord) -> Result<(), StorageError> {
        Self::append(&self.logs, log.clone()).await
    }

    async fn append_batch(&self, logs: &[LogRecord]) -> Result<(), StorageError> {
        Self::append(&self.local_storage_logs, logs.to_vec()).await
    }
}
