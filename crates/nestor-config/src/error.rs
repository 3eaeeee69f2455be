use nestor_cloud::CloudError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "config file not found. Looked in:\n\
        - NESTOR_CONFIG_PATH\n\
        - current directory: nestor.local.yml, nestor.yml, nestor.yaml, .nestor.yml\n\
        - ./.nestor/ directory\n\
        - ~/.config/nestor/nestor.yml"
    )]
    NotFound,

    #[error("config file {} does not exist", .0.display())]
    MissingFile(PathBuf),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),

    #[error("invalid deployment plan: {0}")]
    Plan(#[from] CloudError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
