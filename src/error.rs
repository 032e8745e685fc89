use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvoError {
    #[error("failed to read config file {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to write phylogeny: {0}")]
    Phylogeny(#[from] std::io::Error),
}
