// authorize.rs - Ask the gateway for a decision.

use std::path::Path;

use tg_gateway::{AuthorizationDecision, GatewayConfig};

pub fn execute(
    config: &GatewayConfig,
    capabilities: Option<&Path>,
    subject: &str,
    capability: &str,
    sub_capability: &str,
    show_trace: bool,
    json: bool,
) -> anyhow::Result<()> {
    let gateway = config.build_gateway(capabilities)?;
    let trace = gateway.authorize_with_trace(subject, capability, sub_capability)?;

    if json {
        if show_trace {
            println!("{}", serde_json::to_string_pretty(&trace)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&trace.decision)?);
        }
        return Ok(());
    }

    if show_trace {
        for (i, step) in trace.steps.iter().enumerate() {
            println!(
                "{}. {:<16} {}{}",
                i + 1,
                step.check,
                step.outcome,
                if step.terminal { "  <- decision" } else { "" }
            );
        }
        println!();
    }
    println!("{}", describe(&trace.decision));
    Ok(())
}

fn describe(decision: &AuthorizationDecision) -> String {
    match decision {
        AuthorizationDecision::Allowed => "ALLOWED".to_string(),
        AuthorizationDecision::Denied { reason } => format!("DENIED: {}", reason),
        AuthorizationDecision::ConsentRequired {
            authorize_url,
            sub_capability_key,
            ..
        } => format!(
            "CONSENT REQUIRED for {}\n  Authorize at: {}\n  Then run: tg grant <subject> {}",
            sub_capability_key, authorize_url, sub_capability_key
        ),
    }
}
