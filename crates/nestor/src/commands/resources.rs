use colored::Colorize;
use nestor_cloud::ResourceKind;

pub fn handle() {
    println!("{}", "Supported resource kinds:".bold());
    for kind in ResourceKind::ALL {
        let attributes: Vec<String> = kind.attributes().iter().map(ToString::to_string).collect();
        println!("  {}", kind.config_key().cyan());
        println!("    {}", kind.description());
        println!("    id:         resources.{}.<id>", kind.config_key());
        println!("    attributes: {}", attributes.join(", "));
        if !kind.grant_operations().is_empty() {
            println!("    grantable:  {}", kind.grant_operations().join(", "));
        }
    }
}
