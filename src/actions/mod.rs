pub mod check;
pub mod input;
pub mod output;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::git::GitError;
use crate::github::GitHubError;
use crate::metadata::{Metadata, MetadataError};
use crate::version::{Version, VersionError};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Response printed by both `in` and `out`.
#[derive(Debug, Serialize)]
pub struct Response {
    pub version: Version,
    pub metadata: Metadata,
}

pub(crate) fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), ResourceError> {
    std::fs::write(path, contents).map_err(|source| ResourceError::Io {
        context: format!("failed to write {}", path.display()),
        source,
    })
}

pub(crate) fn read_file(path: &Path) -> Result<String, ResourceError> {
    std::fs::read_to_string(path).map_err(|source| ResourceError::Io {
        context: format!("failed to read {}", path.display()),
        source,
    })
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ResourceError> {
    let json = serde_json::to_vec(value).map_err(|source| ResourceError::Json {
        context: format!("failed to serialize {}", path.display()),
        source,
    })?;
    write_file(path, json)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ResourceError> {
    let text = read_file(path)?;
    serde_json::from_str(&text).map_err(|source| ResourceError::Json {
        context: format!("malformed {}", path.display()),
        source,
    })
}
