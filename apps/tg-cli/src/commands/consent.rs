// consent.rs - Consent subcommands: grant, revoke, grants.
//
// These write through the configured ledger, so a file-backed ledger and
// audit log (the `.toolgate/` defaults) are updated in place.

use std::path::Path;

use tg_consent::{GrantOutcome, RevokeOutcome};
use tg_gateway::GatewayConfig;

pub fn grant(
    config: &GatewayConfig,
    capabilities: Option<&Path>,
    subject: &str,
    sub_capability: &str,
) -> anyhow::Result<()> {
    let gateway = config.build_gateway(capabilities)?;
    let message = match gateway.record_consent(subject, sub_capability)? {
        GrantOutcome::Granted => "granted",
        GrantOutcome::Refreshed => "already granted; timestamp refreshed",
        GrantOutcome::NotRequired => "does not require consent; nothing recorded",
        GrantOutcome::Superseded => "superseded by a newer revoke; nothing changed",
    };
    println!("{} / {}: {}", subject, sub_capability, message);
    Ok(())
}

pub fn revoke(
    config: &GatewayConfig,
    capabilities: Option<&Path>,
    subject: &str,
    sub_capability: &str,
) -> anyhow::Result<()> {
    let gateway = config.build_gateway(capabilities)?;
    let message = match gateway.revoke_consent(subject, sub_capability)? {
        RevokeOutcome::Revoked => "revoked",
        RevokeOutcome::NotGranted => "was not granted",
        RevokeOutcome::Superseded => "superseded by a newer grant; nothing changed",
    };
    println!("{} / {}: {}", subject, sub_capability, message);
    Ok(())
}

pub fn list(
    config: &GatewayConfig,
    capabilities: Option<&Path>,
    subject: &str,
    toolkits: bool,
) -> anyhow::Result<()> {
    let ontology = std::sync::Arc::new(config.load_ontology(capabilities)?);
    let ledger = config.build_ledger(ontology)?;

    if toolkits {
        let toolkits = ledger.granted_toolkits(subject)?;
        if toolkits.is_empty() {
            println!("No toolkits covered for {}.", subject);
        }
        for toolkit in toolkits {
            println!("{}", toolkit);
        }
        return Ok(());
    }

    let grants = ledger.grants_for(subject)?;
    if grants.is_empty() {
        println!("No active grants for {}.", subject);
        return Ok(());
    }

    println!("{:<24} GRANTED AT", "SUB-CAPABILITY");
    println!("{}", "-".repeat(48));
    for grant in grants {
        println!(
            "{:<24} {}",
            grant.sub_capability_key,
            grant.granted_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
