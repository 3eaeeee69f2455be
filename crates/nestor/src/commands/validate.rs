use super::Target;
use colored::Colorize;
use nestor_cloud::WiringRule;

pub fn handle(target: &Target) -> anyhow::Result<()> {
    println!("{}", "Validating config...".blue());
    let loaded = target.load()?;
    loaded.print_header();
    let plan = &loaded.plan;

    println!("{}", "✓ Config is valid".green().bold());
    println!();
    println!("Resources ({}), in provisioning order:", plan.resources.len());
    for resource in plan.ordered()? {
        println!(
            "  - {} {}",
            resource.id.as_str().cyan(),
            resource.physical_name(&plan.identity).dimmed()
        );
    }

    if !plan.wiring.is_empty() {
        println!("Wiring ({}):", plan.wiring.len());
        for rule in &plan.wiring {
            let detail = match rule {
                WiringRule::Grant { function, resource, operations } => {
                    format!("{function} -> {resource} [{}]", operations.join(", "))
                }
                WiringRule::InvokeFromBucket { bucket, function, .. } => format!("{bucket} -> {function}"),
                WiringRule::Route { api, function } => format!("{api} -> {function}"),
            };
            println!("  - {} {} {}", rule.relation().cyan(), detail, rule.statement_id().dimmed());
        }
    }
    Ok(())
}
