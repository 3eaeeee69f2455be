pub mod deploy;
pub mod provision;
pub mod resources;
pub mod validate;

use anyhow::Context;
use colored::Colorize;
use nestor_cloud::DeploymentPlan;
use nestor_cloud_aws::AwsSettings;
use nestor_config::NestorConfig;
use std::path::PathBuf;

/// Global options every command acts on
pub struct Target {
    pub config: Option<PathBuf>,
    pub environment: String,
}

pub struct Loaded {
    pub path: PathBuf,
    pub config: NestorConfig,
    pub plan: DeploymentPlan,
}

impl Target {
    pub fn load(&self) -> anyhow::Result<Loaded> {
        if self.environment.trim().is_empty() {
            anyhow::bail!("environment name must not be empty");
        }
        let path = nestor_config::find_config_file(self.config.as_deref())?;
        let config = nestor_config::load_config(&path)?;
        let plan = nestor_config::build_plan(&config, &self.environment)?;
        Ok(Loaded { path, config, plan })
    }
}

impl Loaded {
    pub fn print_header(&self) {
        println!("Config: {}", self.path.display().to_string().cyan());
        println!("Deployment: {}", self.plan.identity.to_string().cyan());
    }
}

/// Connection settings from the `application` section, falling back to `AWS_REGION`
pub fn aws_settings(config: &NestorConfig) -> anyhow::Result<AwsSettings> {
    let region = match &config.application.region {
        Some(region) => region.clone(),
        None => std::env::var("AWS_REGION")
            .context("no region configured: set application.region or AWS_REGION")?,
    };
    Ok(AwsSettings {
        profile: config.application.profile.clone(),
        region,
        identity_region: config.application.identity_region.clone(),
    })
}
