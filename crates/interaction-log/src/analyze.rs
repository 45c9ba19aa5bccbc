// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-shot analysis of stored logs.
//!
//! Each reader understands one of the three on-disk encodings and counts the records it finds per
//! action. Any I/O or decode error aborts the whole analysis; partial counts are never returned.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::debug;

use crate::error::AnalyzeError;
use crate::model::{self, ActionCount};

/// Paths of the three inputs, one per encoding.
#[derive(Clone, Copy, Debug)]
pub struct AnalyzePaths<'a> {
    /// a single JSON array of records
    pub json: &'a Path,
    /// one JSON record per line
    pub json_lines: &'a Path,
    /// one JSON array of records per line
    pub json_lines_array: &'a Path,
}

/// Reads a file holding one JSON array of records.
pub fn read_json(path: &Path) -> Result<ActionCount, AnalyzeError> {
    let bytes = fs::read(path).map_err(|source| AnalyzeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let logs = model::records_from_slice(&bytes).map_err(|source| AnalyzeError::Decode {
        path: path.to_path_buf(),
        line: None,
        source,
    })?;
    debug!("Read {} logs from {}", logs.len(), path.display());
    Ok(ActionCount::from_records(&logs))
}

/// Reads a file holding one JSON record per line.
pub fn read_json_lines(path: &Path) -> Result<ActionCount, AnalyzeError> {
    let mut logs = Vec::new();
    for_each_line(path, |line| {
        logs.push(model::record_from_slice(line.as_bytes())?);
        Ok(())
    })?;
    debug!("Read {} logs from {}", logs.len(), path.display());
    Ok(ActionCount::from_records(&logs))
}

/// Reads a file holding one JSON array of records per line, flattening all lines.
pub fn read_json_lines_array(path: &Path) -> Result<ActionCount, AnalyzeError> {
    let mut logs = Vec::new();
    for_each_line(path, |line| {
        logs.extend(model::records_from_slice(line.as_bytes())?);
        Ok(())
    })?;
    debug!("Read {} logs from {}", logs.len(), path.display());
    Ok(ActionCount::from_records(&logs))
}

/// Calls `decode` with every non-blank line of `path`, attaching the 1-based line number to
/// decode failures.
fn for_each_line<F>(path: &Path, mut decode: F) -> Result<(), AnalyzeError>
where
    F: FnMut(&str) -> Result<(), serde_json::Error>,
{
    let io_error = |source: io::Error| AnalyzeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_error)?);
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error)?;
        if line.trim().is_empty() {
            continue;
        }
        decode(&line).map_err(|source| AnalyzeError::Decode {
            path: path.to_path_buf(),
            line: Some(index + 1),
            source,
        })?;
    }
    Ok(())
}

/// Counts all three inputs and merges the result.
pub fn run(paths: AnalyzePaths<'_>) -> Result<ActionCount, AnalyzeError> {
    let json = read_json(paths.json)?;
    let json_lines = read_json_lines(paths.json_lines)?;
    let json_lines_array = read_json_lines_array(paths.json_lines_array)?;
    Ok(model::zip(&json, &json_lines, &json_lines_array))
}

/// Writes one `action,count` line per action, in lexicographic order.
pub fn write_csv<W: Write>(count: &ActionCount, mut writer: W) -> io::Result<()> {
    for (action, occurrences) in count.iter() {
        writeln!(writer, "{action},{occurrences}")?;
    }
    writer.flush()
}
