// consent_flow.rs - End-to-end consent flow across ontology, ledger, audit
// and gateway.
//
// Exercises what an agent executor sees:
//
//   1. Load the default ontology
//   2. authorize(u1, repo_ci, create_repo) → ConsentRequired (github URL)
//   3. User completes consent → record_consent
//   4. authorize again → Allowed
//   5. User withdraws → revoke_consent → ConsentRequired again
//   6. Every grant/revoke lands in a hash-chained audit log
//   7. Grants survive a restart when the ledger is file-backed

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tempfile::tempdir;

use tg_audit::{AuditLog, ConsentAction, MemoryAuditSink};
use tg_consent::{ConsentLedger, FileConsentStore, GrantOutcome, RevokeOutcome};
use tg_gateway::{
    AuthorizationDecision, AuthorizationGateway, GatewayConfig, GatewayError, TemplateUrlIssuer,
};
use tg_ontology::{default_ontology, CapabilitiesOntology, OntologyError, ToolkitRegistry};

fn ontology() -> Arc<CapabilitiesOntology> {
    Arc::new(default_ontology(&ToolkitRegistry::default()).unwrap())
}

fn issuer() -> TemplateUrlIssuer {
    TemplateUrlIssuer::new("https://consent.example.com/").unwrap()
}

#[test]
fn grant_then_revoke_round_trip() {
    let sink = Arc::new(MemoryAuditSink::new());
    let ledger = ConsentLedger::in_memory(ontology()).with_audit_sink(sink.clone());
    let gateway = AuthorizationGateway::new(Arc::new(ledger), issuer());

    // Step 2: no grant yet.
    match gateway.authorize("u1", "repo_ci", "create_repo").unwrap() {
        AuthorizationDecision::ConsentRequired {
            authorize_url,
            toolkit,
            ..
        } => {
            assert_eq!(
                authorize_url,
                "https://consent.example.com/authorize/github?user_id=u1&scope=create_repo"
            );
            assert_eq!(toolkit.as_deref(), Some("github"));
        }
        other => panic!("expected ConsentRequired, got {:?}", other),
    }

    // Steps 3-4.
    assert_eq!(
        gateway.record_consent("u1", "create_repo").unwrap(),
        GrantOutcome::Granted
    );
    assert_eq!(
        gateway.authorize("u1", "repo_ci", "create_repo").unwrap(),
        AuthorizationDecision::Allowed
    );

    // Consent is per subject.
    assert!(gateway
        .authorize("u2", "repo_ci", "create_repo")
        .unwrap()
        .is_consent_required());

    // Consent is per sub-capability, not per toolkit.
    assert!(gateway
        .authorize("u1", "repo_ci", "trigger_ci")
        .unwrap()
        .is_consent_required());

    // Step 5.
    assert_eq!(
        gateway.revoke_consent("u1", "create_repo").unwrap(),
        RevokeOutcome::Revoked
    );
    assert!(gateway
        .authorize("u1", "repo_ci", "create_repo")
        .unwrap()
        .is_consent_required());

    // Step 6.
    let actions: Vec<ConsentAction> = sink.events().iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![ConsentAction::Grant, ConsentAction::Revoke]);
}

#[test]
fn non_consent_sub_capabilities_ignore_the_ledger() {
    let gateway = AuthorizationGateway::new(Arc::new(ConsentLedger::in_memory(ontology())), issuer());
    for (capability, sub) in [
        ("research", "web_search"),
        ("database", "migrations"),
        ("qa", "perf_checks"),
        ("content", "generate_readme"),
    ] {
        assert!(
            gateway.authorize("u1", capability, sub).unwrap().is_allowed(),
            "{}.{} should be allowed",
            capability,
            sub
        );
    }
    assert_eq!(
        gateway.record_consent("u1", "web_search").unwrap(),
        GrantOutcome::NotRequired
    );
}

#[test]
fn unknown_keys_are_errors_not_denials() {
    let gateway = AuthorizationGateway::new(Arc::new(ConsentLedger::in_memory(ontology())), issuer());

    assert!(matches!(
        gateway.authorize("u1", "repo_ci", "delete_everything"),
        Err(GatewayError::NotFound(OntologyError::SubCapabilityNotFound { .. }))
    ));
    assert!(matches!(
        gateway.record_consent("u1", "delete_everything"),
        Err(GatewayError::NotFound(OntologyError::UnknownSubCapability { .. }))
    ));
    assert!(matches!(
        gateway.revoke_consent("u1", "delete_everything"),
        Err(GatewayError::NotFound(_))
    ));
}

#[test]
fn stale_grant_loses_to_newer_revoke() {
    let ledger = Arc::new(ConsentLedger::in_memory(ontology()));
    let gateway = AuthorizationGateway::new(Arc::clone(&ledger), issuer());
    let now = Utc::now();

    ledger.revoke_at("u1", "send_updates", now).unwrap();
    // A grant issued before the revoke arrives late.
    assert_eq!(
        ledger
            .grant("u1", "send_updates", now - Duration::seconds(30))
            .unwrap(),
        GrantOutcome::Superseded
    );
    assert!(gateway
        .authorize("u1", "comms", "send_updates")
        .unwrap()
        .is_consent_required());
}

#[test]
fn file_backed_ledger_and_audit_log_survive_restart() {
    let dir = tempdir().unwrap();
    let ledger_path = dir.path().join("consents.json");
    let audit_path = dir.path().join("audit.jsonl");

    {
        let log = AuditLog::open(&audit_path).unwrap();
        let ledger = ConsentLedger::new(ontology(), FileConsentStore::open(&ledger_path).unwrap())
            .unwrap()
            .with_audit_sink(Arc::new(Mutex::new(log)));
        let gateway = AuthorizationGateway::new(Arc::new(ledger), issuer());
        gateway.record_consent("u1", "create_repo").unwrap();
        gateway.record_consent("u1", "provision_envs").unwrap();
        gateway.revoke_consent("u1", "provision_envs").unwrap();
    }

    let log = AuditLog::open(&audit_path).unwrap();
    let ledger = ConsentLedger::new(ontology(), FileConsentStore::open(&ledger_path).unwrap())
        .unwrap()
        .with_audit_sink(Arc::new(Mutex::new(log)));
    let gateway = AuthorizationGateway::new(Arc::new(ledger), issuer());

    assert!(gateway
        .authorize("u1", "repo_ci", "create_repo")
        .unwrap()
        .is_allowed());
    assert!(gateway
        .authorize("u1", "deploy", "provision_envs")
        .unwrap()
        .is_consent_required());

    gateway.record_consent("u1", "trigger_ci").unwrap();
    assert_eq!(AuditLog::verify_chain(&audit_path).unwrap(), 4);

    let toolkits = gateway.ledger().granted_toolkits("u1").unwrap();
    assert_eq!(toolkits.into_iter().collect::<Vec<_>>(), vec!["github"]);
}

#[test]
fn configured_gateway_end_to_end() {
    let dir = tempdir().unwrap();
    let mut config = GatewayConfig::for_project(dir.path());
    config.role = Some("publisher".to_string());
    config.grant_ttl_secs = Some(3600);
    let gateway = config.build_gateway(None).unwrap();

    // Publisher may use deploy targets, after consent.
    assert!(gateway
        .authorize("u1", "deploy", "provision_envs")
        .unwrap()
        .is_consent_required());
    gateway.record_consent("u1", "provision_envs").unwrap();
    assert!(gateway
        .authorize("u1", "deploy", "provision_envs")
        .unwrap()
        .is_allowed());

    // But not GitHub, consent or not.
    gateway.record_consent("u1", "create_repo").unwrap();
    assert!(matches!(
        gateway.authorize("u1", "repo_ci", "create_repo").unwrap(),
        AuthorizationDecision::Denied { .. }
    ));

    let pending = gateway
        .pending_consents(
            "u1",
            &[("deploy", "provision_envs"), ("deploy", "health_checks"), ("content", "blog_posts")],
        )
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0]
        .authorize_url()
        .unwrap()
        .contains("scope=health_checks"));
}
