use polars::prelude::DataFrame;
use tracing::{info, warn};

use crate::config::NeptuneConfig;
use crate::data::columnar::{join_on_index, run_ids, runs_frame, series_frame};
use crate::data::utils::{series_column_name, series_names, MissingSeries, OneOrMany, RunFilter};
use crate::error::{Error, RemoteError, Result};
use crate::remote::http::HttpProject;
use crate::remote::{ProjectApi, RunApi, RunQuery, SYS_ID};

/// Series values for a run set, plus the runs that lacked a series
#[derive(Debug, Clone)]
pub struct SeriesTable {
    pub frame: DataFrame,
    pub missing: Vec<MissingSeries>,
}

/// Source of run tables and metric series
pub trait Downloader {
    /// Table of runs matching `filter`; all columns when `columns` is `None`
    fn download(&self, filter: &RunFilter, columns: Option<&[String]>) -> Result<DataFrame>;

    /// One column per (series, run) pair, named `{series}_{run_id}`
    fn download_series(&self, series: OneOrMany<String>, filter: &RunFilter) -> Result<SeriesTable>;
}

pub struct NeptuneDownloader<P = HttpProject> {
    project: P,
}

impl NeptuneDownloader<HttpProject> {
    /// Resolve the token (argument or `NEPTUNE_API_TOKEN`) and open the
    /// project read-only
    pub fn new(project_name: &str, api_token: Option<String>) -> Result<Self> {
        let config = NeptuneConfig::resolve(project_name, api_token)?;
        Self::connect(&config)
    }

    pub fn connect(config: &NeptuneConfig) -> Result<Self> {
        info!(project = %config.project, "opening project");
        Ok(Self::with_project(HttpProject::connect(config)?))
    }
}

impl<P: ProjectApi> NeptuneDownloader<P> {
    pub fn with_project(project: P) -> Self {
        Self { project }
    }

    pub fn project(&self) -> &P {
        &self.project
    }

    /// Values of one series across all runs. Runs without it are skipped;
    /// no run having it is an error.
    fn fetch_values(&self, series: &str, runs: &[P::Run]) -> Result<(DataFrame, Vec<MissingSeries>)> {
        info!(series, runs = runs.len(), "fetching series values");

        let mut columns = Vec::with_capacity(runs.len());
        let mut missing = Vec::new();
        for run in runs {
            match run.fetch_series_values(series) {
                Ok(points) => {
                    let values: Vec<f64> = points.into_iter().map(|p| p.value).collect();
                    columns.push((series_column_name(series, run.run_id()), values));
                }
                Err(RemoteError::AttributeNotFound { .. }) => {
                    warn!(run_id = run.run_id(), series, "run does not have this series");
                    missing.push(MissingSeries {
                        run_id: run.run_id().to_string(),
                        series: series.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        if missing.len() == runs.len() {
            return Err(Error::SeriesNotFound { series: series.to_string() });
        }
        Ok((series_frame(columns)?, missing))
    }
}

impl<P: ProjectApi> Downloader for NeptuneDownloader<P> {
    fn download(&self, filter: &RunFilter, columns: Option<&[String]>) -> Result<DataFrame> {
        let query = RunQuery::from_filter(filter)?;
        info!(query = query.as_str(), "fetching runs table");
        let rows = self.project.fetch_runs_table(&query, columns)?;
        Ok(runs_frame(&rows, columns)?)
    }

    fn download_series(&self, series: OneOrMany<String>, filter: &RunFilter) -> Result<SeriesTable> {
        filter.validate()?;
        let names = series_names(series)?;

        let id_column = [SYS_ID.to_string()];
        let ids = run_ids(&self.download(filter, Some(&id_column[..]))?)?;

        let runs = ids
            .iter()
            .map(|id| self.project.open_run(id))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut frames = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in &names {
            let (frame, skipped) = self.fetch_values(name, &runs)?;
            frames.push(frame);
            missing.extend(skipped);
        }

        let frame = if frames.len() == 1 {
            frames.remove(0)
        } else {
            join_on_index(frames)?
        };
        Ok(SeriesTable { frame, missing })
    }
}
