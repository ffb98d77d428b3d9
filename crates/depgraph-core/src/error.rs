use std::path::PathBuf;
use thiserror::Error;

/// Core error type for loading depgraph inputs from disk.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read settings at {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings at {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read project file at {path}: {source}")]
    ProjectRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse project file at {path}: {source}")]
    ProjectParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read solution file at {path}: {source}")]
    SolutionRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse solution file at {path}: {source}")]
    SolutionParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Solution file not found from {start}")]
    SolutionNotFound { start: PathBuf },
}
