use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlotError>;

#[derive(Debug, Error)]
pub enum PlotError {
    /// The input layer does not carry the geometry type the operation needs
    #[error("geometry must be {expected} ({path}), found {found}")]
    InputGeometryType {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    /// Zero vertices, zero area or an undefined anchor point
    #[error("degenerate geometry in feature {feature}: {reason}")]
    DegenerateGeometry { feature: String, reason: String },

    #[error("field '{field}' not found ({path})")]
    MissingField { path: PathBuf, field: String },

    #[error("cannot save feature to {path}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("user cancelled operation")]
    Cancelled,
}

impl PlotError {
    pub(crate) fn degenerate(feature: impl ToString, reason: impl Into<String>) -> Self {
        PlotError::DegenerateGeometry {
            feature: feature.to_string(),
            reason: reason.into(),
        }
    }
}
