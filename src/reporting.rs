//! Result aggregation and the JSON conformance report

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use crate::backend::BackendTarget;
use crate::execution::{ExecutionResult, GroupResult};
use crate::pipeline::ValidationState;

/// Timestamp layout used in the report
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Name-keyed entries serialised as a JSON object in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedEntries<T>(Vec<(String, T)>);

impl<T> Default for OrderedEntries<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> OrderedEntries<T> {
    /// Insert, replacing an existing entry of the same name in place
    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.0.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter().map(|(_, value)| value)
    }
}

impl<T: Serialize> Serialize for OrderedEntries<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointReport {
    pub state: ValidationState,
    pub message: String,
    pub url: String,
    #[serde(rename = "type")]
    pub request_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub group_summary: ValidationState,
    pub endpoints: OrderedEntries<EndpointReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStats {
    pub url: String,
    pub baseurl: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecStats {
    pub apifile: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub backend: BackendStats,
    pub execution: ExecutionStats,
    pub spec: SpecStats,
}

/// The conformance report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub result: OrderedEntries<GroupReport>,
    pub stats: RunStats,
}

/// Roll endpoint states into a group summary: anything other than `Valid`
/// or `NotSupported` makes the group `Invalid`, otherwise one `Valid` is enough
pub fn summarize<I>(states: I) -> ValidationState
where
    I: IntoIterator<Item = ValidationState>,
{
    let mut summary = ValidationState::NotSupported;
    for state in states {
        match state {
            ValidationState::Valid => summary = ValidationState::Valid,
            ValidationState::NotSupported => {}
            _ => return ValidationState::Invalid,
        }
    }
    summary
}

fn group_report(group: &GroupResult) -> GroupReport {
    let mut endpoints = OrderedEntries::default();
    for result in &group.endpoints {
        endpoints.insert(
            result.endpoint.id.clone(),
            EndpointReport {
                state: result.state,
                message: result.message.clone(),
                url: result.endpoint.url.clone(),
                request_type: result.endpoint.method.to_string(),
            },
        );
    }

    GroupReport {
        group_summary: summarize(endpoints.values().map(|endpoint| endpoint.state)),
        endpoints,
    }
}

impl Report {
    pub fn build(execution: &ExecutionResult, backend: &BackendTarget, api_source: &str) -> Self {
        let mut result = OrderedEntries::default();
        for group in &execution.groups {
            result.insert(group.name.clone(), group_report(group));
        }

        Report {
            result,
            stats: RunStats {
                backend: BackendStats {
                    url: backend.url.clone(),
                    baseurl: backend.base_url.clone(),
                    version: backend.version.clone().unwrap_or_default(),
                },
                execution: ExecutionStats {
                    start: execution.start_time.format(TIMESTAMP_FORMAT).to_string(),
                    end: execution.end_time.format(TIMESTAMP_FORMAT).to_string(),
                },
                spec: SpecStats {
                    apifile: api_source.to_string(),
                },
            },
        }
    }

    /// Pretty JSON with four-space indentation
    pub fn to_json(&self) -> Result<String, ReportingError> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Write to `output` when given, to stdout otherwise
    pub async fn write(&self, output: Option<&Path>) -> Result<(), ReportingError> {
        let json = self.to_json()?;
        match output {
            Some(path) => {
                tokio::fs::write(path, json.as_bytes()).await?;
                log::info!("Report written to {:?}", path);
            }
            None => println!("{}", json),
        }
        Ok(())
    }
}
