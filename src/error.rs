use std::path::PathBuf;
use thiserror::Error;

/// Problems with the reference data. These abort the run: nothing can be
/// resolved without the hierarchy.
#[derive(Debug, Error)]
pub enum ReferenceDataError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Column '{column}' not found in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Malformed boundary file {path}: {source}")]
    Geometry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Hierarchy has no finest-level units")]
    Empty,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Cyclic alias chain starting at '{0}'")]
    CyclicAlias(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Cyclic alias chain starting at '{0}'")]
    CyclicAlias(String),
}

/// Per-request geocoder failures. The pipeline absorbs these as unresolved.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid geocoder URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        GeocodeError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for GeocodeError {
    fn from(err: serde_json::Error) -> Self {
        GeocodeError::Parse(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MobilityError {
    #[error("Invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),

    #[error("Cannot compute flows between {0} and itself")]
    SameMonth(String),
}
