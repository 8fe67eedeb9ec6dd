//! Translation of run selectors into the service's query language.
//!
//! Alternatives for id, state and owner are OR-ed; tags must all be present.
//! Selectors are AND-ed, and trashed runs are always excluded:
//!
//! ```text
//! ((`sys/trashed`:bool = false) AND ((`sys/tags`:stringSet CONTAINS "expA")))
//! ```

use itertools::Itertools;

use crate::data::utils::RunFilter;
use crate::error::{Error, Result};

const NOT_TRASHED: &str = "(`sys/trashed`:bool = false)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunQuery {
    nql: String,
}

impl RunQuery {
    /// Build the query for a filter; an empty filter or an unknown state is
    /// rejected
    pub fn from_filter(filter: &RunFilter) -> Result<Self> {
        filter.validate()?;

        let mut clauses = vec![Some(NOT_TRASHED.to_string())];
        if let Some(ids) = &filter.id {
            clauses.push(joined(ids.as_slice(), " OR ", |v| eq("sys/id", "string", v)));
        }
        if let Some(states) = &filter.state {
            let labels = states
                .as_slice()
                .iter()
                .map(|s| state_label(s).map(str::to_string))
                .collect::<Result<Vec<_>>>()?;
            clauses.push(joined(&labels, " OR ", |v| eq("sys/state", "experimentState", v)));
        }
        if let Some(owners) = &filter.owner {
            clauses.push(joined(owners.as_slice(), " OR ", |v| eq("sys/owner", "string", v)));
        }
        if let Some(tags) = &filter.tag {
            clauses.push(joined(tags.as_slice(), " AND ", |v| {
                format!("(`sys/tags`:stringSet CONTAINS {})", quote(v))
            }));
        }

        let nql = clauses.into_iter().flatten().map(|c| format!("({c})")).join(" AND ");
        Ok(Self { nql: format!("({nql})") })
    }

    pub fn as_str(&self) -> &str {
        &self.nql
    }
}

fn joined(values: &[String], sep: &str, clause: impl Fn(&str) -> String) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|v| clause(v)).join(sep))
}

fn eq(attribute: &str, kind: &str, value: &str) -> String {
    format!("(`{attribute}`:{kind} = {})", quote(value))
}

/// Map user-facing state names to the service's state labels
fn state_label(state: &str) -> Result<&'static str> {
    match state {
        "running" => Ok("Active"),
        "idle" => Ok("Inactive"),
        other => Err(Error::Validation(format!(
            "Unknown run state {other:?}; expected \"running\" or \"idle\"."
        ))),
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
