use super::{Target, aws_settings};
use crate::reporter::TermReporter;
use colored::Colorize;
use nestor_cloud::{AttributeName, Disposition, Provisioner, Reporter, TracingReporter};
use nestor_cloud_aws::{AwsContext, AwsWiring};

pub async fn handle(target: &Target, json: bool) -> anyhow::Result<()> {
    let loaded = target.load()?;
    let reporter: Box<dyn Reporter> = if json {
        Box::new(TracingReporter::new())
    } else {
        loaded.print_header();
        println!(
            "{} resources, {} wiring rules",
            loaded.plan.resources.len(),
            loaded.plan.wiring.len()
        );
        println!();
        Box::new(TermReporter::new())
    };

    let aws = AwsContext::load(&aws_settings(&loaded.config)?).await?;
    let providers = nestor_cloud_aws::provider_set(&aws);
    let wiring = AwsWiring::from_context(&aws);

    let provisioned = Provisioner::new(&providers, &wiring, reporter.as_ref())
        .provision(&loaded.plan)
        .await?;
    let report = &provisioned.report;

    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    for outcome in &report.resources {
        let marker = match outcome.disposition {
            Disposition::Created => "+".green(),
            Disposition::Existing | Disposition::ExistingAfterRace => "=".dimmed(),
        };
        println!("  {marker} {} {}", outcome.id, outcome.name.cyan());
        if let Some(endpoint) = outcome.attributes.get(&AttributeName::Endpoint) {
            println!("      {}", endpoint.dimmed());
        }
    }
    println!(
        "{} {} ({} ms)",
        "✓ Provisioned:".green().bold(),
        report.summary(),
        report.duration_ms
    );
    Ok(())
}
