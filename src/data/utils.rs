use std::fmt;

use crate::error::{Error, Result};

/// A selector value: either a single item or a list of items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(v) => std::slice::from_ref(v),
            OneOrMany::Many(vs) => vs.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Collapse a single-element list into `One`
    pub fn normalize(self) -> Self {
        match self {
            OneOrMany::Many(mut vs) if vs.len() == 1 => OneOrMany::One(vs.remove(0)),
            other => other,
        }
    }
}

impl From<&str> for OneOrMany<String> {
    fn from(v: &str) -> Self {
        OneOrMany::One(v.to_string())
    }
}

impl From<String> for OneOrMany<String> {
    fn from(v: String) -> Self {
        OneOrMany::One(v)
    }
}

impl From<Vec<String>> for OneOrMany<String> {
    fn from(vs: Vec<String>) -> Self {
        OneOrMany::Many(vs)
    }
}

impl From<Vec<&str>> for OneOrMany<String> {
    fn from(vs: Vec<&str>) -> Self {
        OneOrMany::Many(vs.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for OneOrMany<String> {
    fn from(vs: &[&str]) -> Self {
        OneOrMany::Many(vs.iter().map(|v| v.to_string()).collect())
    }
}

/// Run selectors. Values inside one selector are alternatives; selectors
/// combine conjunctively on the service side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    pub id: Option<OneOrMany<String>>,
    pub state: Option<OneOrMany<String>>,
    pub owner: Option<OneOrMany<String>>,
    pub tag: Option<OneOrMany<String>>,
}

impl RunFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<OneOrMany<String>>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn state(mut self, state: impl Into<OneOrMany<String>>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<OneOrMany<String>>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<OneOrMany<String>>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.state.is_none() && self.owner.is_none() && self.tag.is_none()
    }

    /// Reject a filter with no selector at all
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Validation(
                "At least one of id, state, owner, or tag must be provided.".to_string(),
            ));
        }
        Ok(())
    }
}

/// A run that lacked a requested series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSeries {
    pub run_id: String,
    pub series: String,
}

impl fmt::Display for MissingSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Run {} does not have a column named {}", self.run_id, self.series)
    }
}

/// Column label for one run's values of a series
pub fn series_column_name(series: &str, run_id: &str) -> String {
    format!("{}_{}", series, run_id)
}

/// Turn the requested series selection into an ordered list of names
pub fn series_names(selection: OneOrMany<String>) -> Result<Vec<String>> {
    match selection.normalize() {
        OneOrMany::One(name) => Ok(vec![name]),
        OneOrMany::Many(names) if names.is_empty() => {
            Err(Error::Validation("At least one series name must be provided.".to_string()))
        }
        OneOrMany::Many(names) => Ok(names),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_fails_validation() {
        let err = RunFilter::new().validate().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn any_selector_makes_filter_valid() {
        assert!(RunFilter::new().tag("expA").validate().is_ok());
        assert!(RunFilter::new().state(vec!["running", "idle"]).validate().is_ok());
        assert!(RunFilter::new().owner("alice").validate().is_ok());
        assert!(RunFilter::new().id(vec!["R1".to_string()]).validate().is_ok());
    }

    #[test]
    fn single_element_list_normalizes_to_one() {
        let sel: OneOrMany<String> = vec!["loss"].into();
        assert_eq!(sel.normalize(), OneOrMany::One("loss".to_string()));
    }

    #[test]
    fn series_names_keeps_request_order() {
        let names = series_names(vec!["loss", "acc"].into()).unwrap();
        assert_eq!(names, vec!["loss".to_string(), "acc".to_string()]);
        assert_eq!(series_names("loss".into()).unwrap(), vec!["loss".to_string()]);
    }

    #[test]
    fn empty_series_selection_is_rejected() {
        let err = series_names(OneOrMany::Many(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn column_label_joins_series_and_run() {
        assert_eq!(series_column_name("train/loss", "PRJ-12"), "train/loss_PRJ-12");
    }
}
