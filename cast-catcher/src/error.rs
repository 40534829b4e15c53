use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatcherError {
    #[error("an I/O error occurred: {0}")]
    GenericIo(#[from] std::io::Error),

    #[error("http client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("deserialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("bad catalog source: {0}")]
    CsvError(#[from] csv::Error),

    #[error("bad feed document: {0}")]
    FeedError(#[from] rss::Error),

    #[error("template error: {0}")]
    TemplateError(#[from] minijinja::Error),

    #[error("catalog {} does not exist", .0.display())]
    CatalogMissing(PathBuf),

    #[error("catalog source {} does not exist", .0.display())]
    CatalogSourceMissing(PathBuf),

    #[error("HTML template directory {} does not exist", .0.display())]
    TemplateDirectoryMissing(PathBuf),

    #[error("HTML template {} does not exist", .0.display())]
    TemplateMissing(PathBuf),

    #[error("no download link found, skipping")]
    NoDownloadLink,

    #[error("no image link for podcast '{0}'")]
    MissingImageLink(String),
}
