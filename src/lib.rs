pub mod config;
pub mod error;

pub mod data {
    pub mod columnar;
    pub mod loader;
    pub mod utils;
}

pub mod remote;

pub use config::NeptuneConfig;
pub use data::loader::{Downloader, NeptuneDownloader, SeriesTable};
pub use data::utils::{MissingSeries, OneOrMany, RunFilter};
pub use error::{Error, RemoteError, Result};
