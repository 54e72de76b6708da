//! # tg-cli
//!
//! Command-line interface for Toolgate.
//!
//! Inspects and exercises the authorization gateway for a project:
//! - `tg ontology show/validate` - inspect or check a capabilities file
//! - `tg resolve` - toolkits needed for a set of sub-capabilities
//! - `tg authorize` - ask the gateway for a decision
//! - `tg grant/revoke/grants` - manage recorded consent
//! - `tg audit verify/tail` - inspect the tamper-evident consent audit log

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tg_gateway::GatewayConfig;
use tracing_subscriber::EnvFilter;

/// Toolgate CLI - capability consent and tool authorization.
#[derive(Parser)]
#[command(name = "tg", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Capabilities ontology file, overriding $CAPABILITIES_FILE and config.
    #[arg(long, global = true)]
    capabilities: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the capabilities ontology.
    Ontology {
        #[command(subcommand)]
        command: commands::ontology::OntologyCommands,
    },
    /// List the toolkits a set of sub-capabilities needs.
    Resolve {
        /// Sub-capability keys.
        #[arg(required = true)]
        sub_capabilities: Vec<String>,
    },
    /// Ask the gateway whether a subject may use a sub-capability.
    Authorize {
        subject: String,
        capability: String,
        sub_capability: String,
        /// Show every check the gateway ran.
        #[arg(long)]
        trace: bool,
        /// Print the decision as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Record a subject's consent for a sub-capability.
    Grant {
        subject: String,
        sub_capability: String,
    },
    /// Withdraw a subject's consent for a sub-capability.
    Revoke {
        subject: String,
        sub_capability: String,
    },
    /// List a subject's active grants.
    Grants {
        subject: String,
        /// Show the toolkits covered instead of individual grants.
        #[arg(long)]
        toolkits: bool,
    },
    /// Inspect the consent audit log.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tg_gateway=info".parse()?)
                .add_directive("tg_consent=info".parse()?)
                .add_directive("tg_ontology=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = GatewayConfig::load(&project_root)?;
    let capabilities = cli.capabilities.as_deref();

    match &cli.command {
        Commands::Ontology { command } => {
            commands::ontology::execute(command, &config, capabilities)
        }
        Commands::Resolve { sub_capabilities } => {
            commands::resolve::execute(sub_capabilities, &config, capabilities)
        }
        Commands::Authorize {
            subject,
            capability,
            sub_capability,
            trace,
            json,
        } => commands::authorize::execute(
            &config,
            capabilities,
            subject,
            capability,
            sub_capability,
            *trace,
            *json,
        ),
        Commands::Grant {
            subject,
            sub_capability,
        } => commands::consent::grant(&config, capabilities, subject, sub_capability),
        Commands::Revoke {
            subject,
            sub_capability,
        } => commands::consent::revoke(&config, capabilities, subject, sub_capability),
        Commands::Grants { subject, toolkits } => {
            commands::consent::list(&config, capabilities, subject, *toolkits)
        }
        Commands::Audit { command } => commands::audit::execute(command, &config),
    }
}
