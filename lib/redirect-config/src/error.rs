use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read \"{}\"", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration document")]
    Parse(#[from] serde_json::Error),
    #[error("invalid executable pattern \"{pattern}\"")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("\"{field}\" must be an absolute path, found \"{value}\"")]
    NotAbsolute { field: String, value: String },
}
