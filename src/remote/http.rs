//! Blocking HTTP client for the Neptune REST API.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::NeptuneConfig;
use crate::error::{RemoteError, Result};
use crate::remote::{FieldValue, ProjectApi, RunApi, RunQuery, RunRow, SeriesPoint};

const TOKEN_PATH: &str = "/api/backend/v1/authorization/oauth-token";
const SEARCH_PATH: &str = "/api/leaderboard/v1/leaderboard/entries/search/";
const EXPERIMENT_PATH: &str = "/api/leaderboard/v1/experiments";
const FLOAT_SERIES_PATH: &str = "/api/leaderboard/v1/attributes/series/float";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct EntriesResponse {
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    attributes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    values: Vec<SeriesValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesValue {
    #[serde(default)]
    step: f64,
    value: f64,
    #[serde(default)]
    timestamp_millis: i64,
}

/// Shared connection state for one project and its runs
#[derive(Clone)]
struct Session {
    agent: ureq::Agent,
    base_url: String,
    access_token: String,
}

impl Session {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Read-only project handle backed by the REST API
pub struct HttpProject {
    session: Session,
    project: String,
}

impl HttpProject {
    /// Exchange the API token for an access token and open the project
    pub fn connect(config: &NeptuneConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(config.timeout)
            .http_status_as_error(false)
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);

        let url = format!("{}{}", base_url, TOKEN_PATH);
        debug!(%url, "exchanging API token");
        let mut response = agent
            .get(&url)
            .header("X-Neptune-Api-Token", config.api_token.as_str())
            .call()
            .map_err(RemoteError::from)?;
        let token: TokenResponse = read_json(&url, &mut response)?;

        Ok(Self {
            session: Session { agent, base_url, access_token: token.access_token },
            project: config.project.clone(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }
}

impl ProjectApi for HttpProject {
    type Run = HttpRun;

    fn fetch_runs_table(
        &self,
        query: &RunQuery,
        columns: Option<&[String]>,
    ) -> std::result::Result<Vec<RunRow>, RemoteError> {
        let url = self.session.url(SEARCH_PATH);
        let body = search_body(query, columns);
        debug!(%url, query = query.as_str(), "searching runs");

        let mut response = self
            .session
            .agent
            .post(&url)
            .query("projectIdentifier", &self.project)
            .header("Authorization", self.session.bearer())
            .header("Content-Type", "application/json")
            .send(body.to_string().as_bytes())?;
        let entries: EntriesResponse = read_json(&url, &mut response)?;

        Ok(entries.entries.iter().map(|e| parse_entry(&e.attributes)).collect())
    }

    fn open_run(&self, run_id: &str) -> std::result::Result<HttpRun, RemoteError> {
        let url = self.session.url(EXPERIMENT_PATH);
        let qualified = format!("{}/{}", self.project, run_id);
        debug!(%url, run_id, "opening run");

        let mut response = self
            .session
            .agent
            .get(&url)
            .query("experimentId", &qualified)
            .header("Authorization", self.session.bearer())
            .call()?;
        let experiment: ExperimentResponse = read_json(&url, &mut response)?;

        Ok(HttpRun {
            session: self.session.clone(),
            run_id: run_id.to_string(),
            internal_id: experiment.id,
        })
    }
}

/// Read-only run handle
pub struct HttpRun {
    session: Session,
    run_id: String,
    internal_id: String,
}

impl RunApi for HttpRun {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn fetch_series_values(&self, series: &str) -> std::result::Result<Vec<SeriesPoint>, RemoteError> {
        let url = self.session.url(FLOAT_SERIES_PATH);
        debug!(%url, run_id = %self.run_id, series, "fetching series");

        let mut response = self
            .session
            .agent
            .get(&url)
            .query("experimentId", &self.internal_id)
            .query("attribute", series)
            .header("Authorization", self.session.bearer())
            .call()?;

        if response.status().as_u16() == 404 {
            return Err(RemoteError::AttributeNotFound {
                run_id: self.run_id.clone(),
                attribute: series.to_string(),
            });
        }
        let parsed: SeriesResponse = read_json(&url, &mut response)?;
        Ok(parsed
            .values
            .into_iter()
            .map(|v| SeriesPoint { step: v.step, value: v.value, timestamp_millis: v.timestamp_millis })
            .collect())
    }
}

fn read_json<T: DeserializeOwned>(
    url: &str,
    response: &mut ureq::http::Response<ureq::Body>,
) -> std::result::Result<T, RemoteError> {
    let status = response.status().as_u16();
    let text = response.body_mut().read_to_string()?;
    if !(200..300).contains(&status) {
        return Err(RemoteError::Status { status, url: url.to_string(), body: text });
    }
    Ok(serde_json::from_str(&text)?)
}

fn search_body(query: &RunQuery, columns: Option<&[String]>) -> Value {
    let mut body = json!({ "query": { "query": query.as_str() } });
    if let Some(columns) = columns {
        let filters: Vec<Value> = columns.iter().map(|c| json!({ "path": c })).collect();
        body["attributeFilters"] = Value::Array(filters);
    }
    body
}

fn parse_entry(attributes: &[Value]) -> RunRow {
    attributes.iter().filter_map(parse_attribute).collect()
}

/// Decode one `{name, type, <type>Properties}` attribute. Types with no
/// tabular representation (files, artifacts) are skipped.
fn parse_attribute(attr: &Value) -> Option<(String, FieldValue)> {
    let name = attr.get("name")?.as_str()?.to_string();
    let kind = attr.get("type")?.as_str()?;
    let props = attr.get(format!("{kind}Properties"))?;

    let value = match kind {
        "string" | "experimentState" => props.get("value").and_then(Value::as_str).map(|s| FieldValue::Str(s.to_string())),
        "datetime" => props.get("value").and_then(Value::as_str).map(|s| FieldValue::Datetime(s.to_string())),
        "float" => props.get("value").and_then(Value::as_f64).map(FieldValue::Float),
        "int" => props.get("value").and_then(Value::as_i64).map(FieldValue::Int),
        "bool" => props.get("value").and_then(Value::as_bool).map(FieldValue::Bool),
        "stringSet" => props.get("values").and_then(Value::as_array).map(|vs| {
            FieldValue::StrSet(vs.iter().filter_map(Value::as_str).map(str::to_string).collect())
        }),
        "floatSeries" => props.get("last").and_then(Value::as_f64).map(FieldValue::Float),
        "stringSeries" => props.get("last").and_then(Value::as_str).map(|s| FieldValue::Str(s.to_string())),
        _ => return None,
    };
    Some((name, value.unwrap_or(FieldValue::Null)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::utils::RunFilter;

    #[test]
    fn parses_entry_attributes() {
        let attrs = json!([
            { "name": "sys/id", "type": "string", "stringProperties": { "value": "R1" } },
            { "name": "sys/state", "type": "experimentState", "experimentStateProperties": { "value": "Inactive" } },
            { "name": "sys/tags", "type": "stringSet", "stringSetProperties": { "values": ["expA", "b"] } },
            { "name": "params/lr", "type": "float", "floatProperties": { "value": 0.01 } },
            { "name": "params/epochs", "type": "int", "intProperties": { "value": 10 } },
            { "name": "sys/trashed", "type": "bool", "boolProperties": { "value": false } },
            { "name": "train/loss", "type": "floatSeries", "floatSeriesProperties": { "last": 0.2 } },
            { "name": "sys/creation_time", "type": "datetime", "datetimeProperties": { "value": "2023-01-01T00:00:00Z" } },
            { "name": "source_code/files", "type": "fileSet", "fileSetProperties": { "size": 3 } }
        ]);
        let row = parse_entry(attrs.as_array().unwrap());

        assert_eq!(row.id(), Some("R1"));
        assert_eq!(row.get("sys/state"), Some(&FieldValue::Str("Inactive".into())));
        assert_eq!(
            row.get("sys/tags"),
            Some(&FieldValue::StrSet(vec!["expA".into(), "b".into()]))
        );
        assert_eq!(row.get("params/lr"), Some(&FieldValue::Float(0.01)));
        assert_eq!(row.get("params/epochs"), Some(&FieldValue::Int(10)));
        assert_eq!(row.get("sys/trashed"), Some(&FieldValue::Bool(false)));
        assert_eq!(row.get("train/loss"), Some(&FieldValue::Float(0.2)));
        assert_eq!(
            row.get("sys/creation_time"),
            Some(&FieldValue::Datetime("2023-01-01T00:00:00Z".into()))
        );
        assert_eq!(row.get("source_code/files"), None);
    }

    #[test]
    fn attribute_without_value_is_null() {
        let attr = json!({ "name": "params/lr", "type": "float", "floatProperties": {} });
        assert_eq!(parse_attribute(&attr), Some(("params/lr".to_string(), FieldValue::Null)));
    }

    #[test]
    fn search_body_carries_query_and_columns() {
        let query = RunQuery::from_filter(&RunFilter::new().tag("expA")).unwrap();
        let columns = vec!["sys/id".to_string()];
        let body = search_body(&query, Some(columns.as_slice()));
        assert_eq!(body["query"]["query"], json!(query.as_str()));
        assert_eq!(body["attributeFilters"], json!([{ "path": "sys/id" }]));

        let body = search_body(&query, None);
        assert!(body.get("attributeFilters").is_none());
    }

    #[test]
    fn series_response_keeps_values_in_order() {
        let parsed: SeriesResponse = serde_json::from_value(json!({
            "values": [
                { "step": 0.0, "value": 0.9, "timestampMillis": 1 },
                { "step": 1.0, "value": 0.5, "timestampMillis": 2 }
            ],
            "totalItemCount": 2
        }))
        .unwrap();
        let values: Vec<f64> = parsed.values.iter().map(|v| v.value).collect();
        assert_eq!(values, vec![0.9, 0.5]);
    }
}
