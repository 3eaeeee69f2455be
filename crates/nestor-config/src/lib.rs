//! Nestor project configuration
//!
//! Finds `nestor.yml`, parses and validates it, and turns it into a
//! [`nestor_cloud::DeploymentPlan`].

pub mod discovery;
pub mod error;
pub mod model;
pub mod plan;
pub mod validate;

pub use discovery::find_config_file;
pub use error::*;
pub use model::NestorConfig;
pub use plan::{PlannedDeployment, build_plan, planned_deployments};

use std::path::Path;
use tracing::{debug, instrument};

/// Parse and validate a config document
pub fn parse_config(content: &str) -> Result<NestorConfig> {
    let config: NestorConfig = serde_yaml::from_str(content)?;
    validate::validate(&config)?;
    Ok(config)
}

/// Load a config file; artifact paths are resolved against its directory
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_config(path: &Path) -> Result<NestorConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content).map_err(|e| match e {
        ConfigError::Yaml(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    debug!(application = %config.application.name, "Config loaded");
    Ok(config)
}
