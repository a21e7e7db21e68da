use std::{io, path::PathBuf};

use thiserror::Error;

use crate::config::RemoteConfigError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to decode store record {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store record {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store record {key} has version {found}; newest supported is {supported}")]
    UnsupportedVersion {
        key: String,
        found: u32,
        supported: u32,
    },
    #[error("failed to access store file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] RemoteConfigError),
    #[error("failed to read scenario from {path:?}: {source}")]
    ScenarioRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse scenario: {0}")]
    ScenarioParse(#[from] serde_json::Error),
}

pub type Result<T, E = RemoteError> = std::result::Result<T, E>;
