use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use polars::prelude::DataFrame;
use tracing_subscriber::EnvFilter;

use exphub::config::API_URL_ENV;
use exphub::data::columnar::write_csv;
use exphub::{Downloader, MissingSeries, NeptuneConfig, NeptuneDownloader, OneOrMany, RunFilter};

#[derive(Debug, Parser)]
#[command(name = "exphub", about = "Download experiment runs and metric series as tables")]
struct Cli {
    /// Project identifier, `workspace/project`
    #[arg(long, short)]
    project: String,

    /// API token; NEPTUNE_API_TOKEN is used when omitted
    #[arg(long)]
    api_token: Option<String>,

    /// Service address; decoded from the token when omitted
    #[arg(long, env = API_URL_ENV)]
    api_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Write the table as CSV instead of printing it
    #[arg(long, short)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Table of runs and their attributes
    Runs {
        #[command(flatten)]
        filter: FilterArgs,

        /// Attributes to include (all when omitted)
        #[arg(long, short, num_args = 1..)]
        columns: Vec<String>,
    },
    /// Float series values, one column per run
    Series {
        /// Series names, e.g. `train/loss`
        #[arg(required = true)]
        names: Vec<String>,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long, num_args = 1..)]
    id: Vec<String>,
    /// `running` or `idle`
    #[arg(long, num_args = 1..)]
    state: Vec<String>,
    #[arg(long, num_args = 1..)]
    owner: Vec<String>,
    #[arg(long, num_args = 1..)]
    tag: Vec<String>,
}

impl FilterArgs {
    fn into_filter(self) -> RunFilter {
        RunFilter {
            id: selector(self.id),
            state: selector(self.state),
            owner: selector(self.owner),
            tag: selector(self.tag),
        }
    }
}

fn selector(values: Vec<String>) -> Option<OneOrMany<String>> {
    match values.len() {
        0 => None,
        1 => values.into_iter().next().map(OneOrMany::One),
        _ => Some(OneOrMany::Many(values)),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = NeptuneConfig::resolve(&cli.project, cli.api_token)?;
    if let Some(url) = cli.api_url {
        config = config.with_api_url(url);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    let downloader = NeptuneDownloader::connect(&config)
        .with_context(|| format!("failed to open project {}", config.project))?;

    let mut frame = match cli.command {
        Command::Runs { filter, columns } => {
            let columns = (!columns.is_empty()).then_some(columns);
            downloader.download(&filter.into_filter(), columns.as_deref())?
        }
        Command::Series { names, filter } => {
            let table = downloader.download_series(OneOrMany::Many(names), &filter.into_filter())?;
            if !table.missing.is_empty() {
                eprintln!("{}", missing_report(&table.missing));
            }
            table.frame
        }
    };

    emit(&mut frame, cli.output)
}

fn emit(frame: &mut DataFrame, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("cannot create {}", path.display()))?;
            write_csv(frame, file).with_context(|| format!("cannot write {}", path.display()))?;
            tracing::info!(path = %path.display(), rows = frame.height(), "table written");
        }
        None => println!("{frame}"),
    }
    Ok(())
}

fn missing_report(missing: &[MissingSeries]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["series", "run", "status"]);
    for m in missing {
        table.add_row(vec![m.series.as_str(), m.run_id.as_str(), "missing"]);
    }
    table
}
