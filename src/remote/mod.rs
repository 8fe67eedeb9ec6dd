//! Boundary to the remote tracking service.
//!
//! [`ProjectApi`] and [`RunApi`] are the only operations the downloader
//! needs. [`http`] implements them against the Neptune REST API.

use std::collections::BTreeMap;

use crate::error::RemoteError;

pub mod http;
pub mod query;

pub use query::RunQuery;

/// Attribute holding the run identifier
pub const SYS_ID: &str = "sys/id";

/// A single attribute value as reported by the service
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    StrSet(Vec<String>),
    /// RFC 3339 timestamp, kept as text
    Datetime(String),
    Null,
}

/// One row of the runs table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRow {
    pub attributes: BTreeMap<String, FieldValue>,
}

impl RunRow {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name)
    }

    pub fn id(&self) -> Option<&str> {
        match self.attributes.get(SYS_ID) {
            Some(FieldValue::Str(id)) => Some(id.as_str()),
            _ => None,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for RunRow {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// One logged observation of a float series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub step: f64,
    pub value: f64,
    pub timestamp_millis: i64,
}

/// Read-only access to a project
pub trait ProjectApi {
    type Run: RunApi;

    /// Fetch runs matching `query`; `columns = None` requests every attribute
    fn fetch_runs_table(
        &self,
        query: &RunQuery,
        columns: Option<&[String]>,
    ) -> Result<Vec<RunRow>, RemoteError>;

    /// Open a read-only handle to a single run
    fn open_run(&self, run_id: &str) -> Result<Self::Run, RemoteError>;
}

/// Read-only access to a single run
pub trait RunApi {
    fn run_id(&self) -> &str;

    /// All values of a float series; [`RemoteError::AttributeNotFound`] if the
    /// run never logged it
    fn fetch_series_values(&self, series: &str) -> Result<Vec<SeriesPoint>, RemoteError>;
}
