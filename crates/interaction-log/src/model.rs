// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Binds JSON `null` to the zero value of the field, matching how missing fields are treated.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Sequence element that binds `null` to its zero value.
struct NullAsDefault<T>(T);

impl<'de, T> Deserialize<'de> for NullAsDefault<T>
where
    T: Default + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        null_as_default(deserializer).map(NullAsDefault)
    }
}

fn unwrap_elements<T>(elements: Vec<NullAsDefault<T>>) -> Vec<T> {
    elements.into_iter().map(|element| element.0).collect()
}

/// Like `null_as_default` for a sequence, applied to the sequence and to each of its elements.
fn elements_null_as_default<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let elements = Option::<Vec<NullAsDefault<T>>>::deserialize(deserializer)?;
    Ok(elements.map(unwrap_elements).unwrap_or_default())
}

/// Keeps a `null` sequence as `None`, but binds `null` elements to their zero value.
fn optional_elements_null_as_default<'de, D, T>(
    deserializer: D,
) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let elements = Option::<Vec<NullAsDefault<T>>>::deserialize(deserializer)?;
    Ok(elements.map(unwrap_elements))
}

/// Edges are rows of labels. A `null` row binds to an empty row and a `null` label to `""`.
fn edges_null_as_default<'de, D>(deserializer: D) -> Result<Option<Vec<Vec<String>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows =
        Option::<Vec<NullAsDefault<Vec<NullAsDefault<String>>>>>::deserialize(deserializer)?;
    Ok(rows.map(|rows| rows.into_iter().map(|row| unwrap_elements(row.0)).collect()))
}

/// One user interaction event submitted by a client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(rename = "node", deserialize_with = "null_as_default")]
    pub node_data: NodeData,
    #[serde(deserialize_with = "null_as_default")]
    pub time: i64,
}

/// Graph context captured at the time of an interaction.
///
/// Sequences keep the difference between absent (`null`) and empty (`[]`) so that
/// a stored line reads back exactly as it was submitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeData {
    #[serde(deserialize_with = "null_as_default")]
    pub node: i64,
    #[serde(deserialize_with = "optional_elements_null_as_default")]
    pub position: Option<Vec<f64>>,
    #[serde(deserialize_with = "edges_null_as_default")]
    pub edges: Option<Vec<Vec<String>>>,
    #[serde(deserialize_with = "optional_elements_null_as_default")]
    pub toplabel: Option<Vec<String>>,
    #[serde(deserialize_with = "optional_elements_null_as_default")]
    pub botlabel: Option<Vec<String>>,
    /// Optional metadata, carried through but never interpreted.
    #[serde(alias = "Valuation", skip_serializing_if = "Option::is_none")]
    pub valuation: Option<String>,
}

/// Body of `POST /log`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleLogRequest {
    #[serde(deserialize_with = "null_as_default")]
    pub log: LogRecord,
}

/// Body of `POST /logs`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogBatchRequest {
    #[serde(deserialize_with = "elements_null_as_default")]
    pub logs: Vec<LogRecord>,
}

/// Decodes one JSON record. A `null` document is a zero-valued record.
pub fn record_from_slice(bytes: &[u8]) -> serde_json::Result<LogRecord> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let record = null_as_default(&mut deserializer)?;
    deserializer.end()?;
    Ok(record)
}

/// Decodes one JSON array of records. `null` elements are zero-valued records and a `null`
/// document is an empty batch.
pub fn records_from_slice(bytes: &[u8]) -> serde_json::Result<Vec<LogRecord>> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let records = elements_null_as_default(&mut deserializer)?;
    deserializer.end()?;
    Ok(records)
}

/// Number of occurrences of each action. Keys iterate in lexicographic order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionCount(BTreeMap<String, u64>);

impl ActionCount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one occurrence per record, keyed by its action.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a LogRecord>,
    {
        let mut count = Self::new();
        for record in records {
            count.increment(&record.action);
        }
        count
    }

    pub fn increment(&mut self, action: &str) {
        self.add(action, 1);
    }

    pub fn add(&mut self, action: &str, amount: u64) {
        match self.0.get_mut(action) {
            Some(count) => *count += amount,
            None => {
                self.0.insert(action.to_string(), amount);
            }
        }
    }

    /// Adds every count of `other` into `self`.
    pub fn merge(&mut self, other: &ActionCount) {
        for (action, count) in other.iter() {
            self.add(action, count);
        }
    }

    pub fn get(&self, action: &str) -> Option<u64> {
        self.0.get(action).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(action, count)| (action.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

impl FromIterator<(String, u64)> for ActionCount {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut count = Self::new();
        for (action, amount) in iter {
            count.add(&action, amount);
        }
        count
    }
}

/// Key-wise sum of three counts. Keys missing from an input count as zero.
pub fn zip(a: &ActionCount, b: &ActionCount, c: &ActionCount) -> ActionCount {
    let mut zipped = ActionCount::new();
    zipped.merge(a);
    zipped.merge(b);
    zipped.merge(c);
    zipped
}
