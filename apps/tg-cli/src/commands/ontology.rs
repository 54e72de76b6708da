// ontology.rs - Ontology subcommands: show, validate.

use std::path::{Path, PathBuf};

use clap::{Subcommand, ValueEnum};
use tg_gateway::GatewayConfig;
use tg_ontology::CapabilitiesOntology;

#[derive(Subcommand)]
pub enum OntologyCommands {
    /// Print the loaded ontology.
    Show {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Check an ontology file without loading it into the gateway.
    Validate {
        /// File to check (.json, .yaml, or .yml).
        file: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
    Yaml,
}

pub fn execute(
    cmd: &OntologyCommands,
    config: &GatewayConfig,
    capabilities: Option<&Path>,
) -> anyhow::Result<()> {
    match cmd {
        OntologyCommands::Show { format } => {
            let ontology = config.load_ontology(capabilities)?;
            match format {
                Format::Table => print!("{}", render_table(&ontology)),
                Format::Json => {
                    println!("{}", serde_json::to_string_pretty(&ontology.to_document())?)
                }
                Format::Yaml => print!("{}", serde_yaml::to_string(&ontology.to_document())?),
            }
        }

        OntologyCommands::Validate { file } => {
            let ontology = tg_ontology::read_file(file, &config.registry())?;
            let subs: usize = ontology
                .capabilities()
                .iter()
                .map(|c| c.sub_capabilities.len())
                .sum();
            println!(
                "{} is valid: {} capabilities, {} sub-capabilities (version {}).",
                file.display(),
                ontology.capabilities().len(),
                subs,
                &ontology.version()[..12]
            );
        }
    }

    Ok(())
}

fn render_table(ontology: &CapabilitiesOntology) -> String {
    let mut out = format!(
        "{:<12} {:<22} {:<8} TOOLKITS\n",
        "CAPABILITY", "SUB-CAPABILITY", "CONSENT"
    );
    out.push_str(&"-".repeat(64));
    out.push('\n');
    for capability in ontology.capabilities() {
        for sub in &capability.sub_capabilities {
            let toolkits: Vec<&str> = sub.toolkits.iter().map(String::as_str).collect();
            out.push_str(&format!(
                "{:<12} {:<22} {:<8} {}\n",
                capability.key,
                sub.key,
                if sub.requires_consent { "yes" } else { "no" },
                if toolkits.is_empty() {
                    "-".to_string()
                } else {
                    toolkits.join(", ")
                }
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_ontology::{default_ontology, ToolkitRegistry};

    #[test]
    fn table_lists_every_sub_capability() {
        let ontology = default_ontology(&ToolkitRegistry::default()).unwrap();
        let table = render_table(&ontology);
        assert!(table.contains("create_repo"));
        assert!(table.contains("vercel, render, fly"));
        let rows = table.lines().count() - 2;
        let expected: usize = ontology
            .capabilities()
            .iter()
            .map(|c| c.sub_capabilities.len())
            .sum();
        assert_eq!(rows, expected);
    }
}
