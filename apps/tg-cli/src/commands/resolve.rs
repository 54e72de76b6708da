// resolve.rs - Toolkit resolution for a plan's sub-capabilities.

use std::path::Path;

use tg_gateway::GatewayConfig;

pub fn execute(
    sub_capabilities: &[String],
    config: &GatewayConfig,
    capabilities: Option<&Path>,
) -> anyhow::Result<()> {
    let ontology = config.load_ontology(capabilities)?;
    let toolkits = ontology.resolve_toolkits(sub_capabilities)?;

    if toolkits.is_empty() {
        println!("No toolkits required.");
    } else {
        for toolkit in toolkits {
            println!("{}", toolkit);
        }
    }
    Ok(())
}
