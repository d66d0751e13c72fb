use std::collections::HashMap;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use crate::error::RenderError;

pub const INFO_LABELS: [&str; 4] = ["Model Family:", "Device Model:", "Serial Number:", "User Capacity:"];
pub const SERIAL_LABEL: &str = "Serial Number:";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Attribute {
    pub id: String,
    pub name: String,
    pub value: u32,
    pub worst: u32,
    pub thresh: u32,
    pub raw_value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub date: NaiveDateTime,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceInfo {
    pub values: HashMap<String, String>,
}

impl DeviceInfo {
    pub fn get(&self, label: &str) -> Option<&str> { self.values.get(label).map(|s| s.as_str()) }

    pub fn serial_number(&self) -> Result<&str, RenderError> {
        self.get(SERIAL_LABEL)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| RenderError::Precondition(format!("device info has no {} entry", SERIAL_LABEL)))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceInfo {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        DeviceInfo { values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

/// Current reading plus the optional previous and first-ever (baseline) readings.
#[derive(Clone, Debug)]
pub struct RunList<'a> {
    pub current: &'a Run,
    pub previous: Option<&'a Run>,
    pub baseline: Option<&'a Run>,
}

impl<'a> RunList<'a> {
    pub fn new(current: &'a Run, previous: Option<&'a Run>, baseline: Option<&'a Run>) -> Self {
        RunList { current, previous, baseline }
    }

    /// Rows are matched by position, so every historical run must cover the current one.
    pub fn validate(&self) -> Result<(), RenderError> {
        let count = self.current.attributes.len();
        for (label, run) in [("previous", self.previous), ("baseline", self.baseline)] {
            if let Some(r) = run && r.attributes.len() < count {
                return Err(RenderError::Precondition(format!(
                    "{} run has {} attributes but current run has {}", label, r.attributes.len(), count
                )));
            }
        }
        Ok(())
    }
}

/// On-disk history document consumed by the CLI.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    pub device: DeviceInfo,
    pub current: Run,
    #[serde(default)]
    pub previous: Option<Run>,
    #[serde(default)]
    pub baseline: Option<Run>,
}

impl History {
    pub fn run_list(&self) -> RunList<'_> { RunList::new(&self.current, self.previous.as_ref(), self.baseline.as_ref()) }
}

pub fn load_history(path: &std::path::Path) -> Result<History, RenderError> {
    let data = std::fs::read(path).map_err(|e| RenderError::Io { path: path.to_path_buf(), source: e })?;
    serde_json::from_slice(&data).map_err(|e| RenderError::History { path: path.to_path_buf(), source: e })
}
