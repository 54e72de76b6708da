// config.rs - Gateway configuration.
//
// GatewayConfig determines where the gateway keeps its state: the ontology
// override, the durable consent ledger and the audit log. The
// `for_project()` constructor generates defaults under a `.toolgate/`
// directory in the project root; `load()` overlays `.toolgate/toolgate.toml`
// when present.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tg_audit::AuditLog;
use tg_consent::{ConsentLedger, FileConsentStore, LedgerError};
use tg_ontology::{CapabilitiesOntology, OntologyLoader, ToolkitRegistry};

use crate::error::GatewayError;
use crate::gateway::AuthorizationGateway;
use crate::issuer::TemplateUrlIssuer;
use crate::policy::{ApprovalGate, DenyList, RoleToolPolicy};

/// Name of the project-local state directory.
pub const STATE_DIR: &str = ".toolgate";

/// Name of the config file inside [`STATE_DIR`].
pub const CONFIG_FILE: &str = "toolgate.toml";

/// Configuration for the authorization gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Configured ontology override. Used only if the file exists and no
    /// higher-precedence source (`--capabilities`, `$CAPABILITIES_FILE`)
    /// supplies one.
    pub ontology_file: Option<PathBuf>,

    /// Durable consent ledger. `None` keeps consent for the process only.
    pub ledger_file: Option<PathBuf>,

    /// Append-only, hash-chained audit log of grants and revokes.
    pub audit_log: Option<PathBuf>,

    /// Grants older than this many seconds read as absent.
    pub grant_ttl_secs: Option<u64>,

    /// Base URL for consent links.
    pub authorize_base_url: String,

    /// Toolkits recognized in addition to the built-in set.
    pub extra_toolkits: Vec<String>,

    /// Deny-listed `capability` or `capability.sub_capability` entries.
    pub deny: Vec<String>,

    /// Agent role whose toolkit allowlist and approval gate apply to every
    /// call.
    pub role: Option<String>,

    /// `capability.sub_capability` entries approved for the role's
    /// sensitive actions.
    pub approved: Vec<String>,

    /// Where this config was (or would be) read from; named in errors.
    #[serde(skip)]
    config_path: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ontology_file: None,
            ledger_file: None,
            audit_log: None,
            grant_ttl_secs: None,
            authorize_base_url: default_authorize_base_url(),
            extra_toolkits: Vec::new(),
            deny: Vec::new(),
            role: None,
            approved: Vec::new(),
            config_path: PathBuf::from(CONFIG_FILE),
        }
    }
}

fn default_authorize_base_url() -> String {
    "http://localhost:8787/".to_string()
}

impl GatewayConfig {
    /// Create a config with the standard `.toolgate/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let state_dir = project_root.as_ref().join(STATE_DIR);
        Self {
            ontology_file: Some(state_dir.join("capabilities.json")),
            ledger_file: Some(state_dir.join("consents.json")),
            audit_log: Some(state_dir.join("audit.jsonl")),
            config_path: state_dir.join(CONFIG_FILE),
            ..Self::default()
        }
    }

    /// Load `.toolgate/toolgate.toml`, falling back to [`for_project`]
    /// defaults when the file does not exist.
    ///
    /// Keys missing from the file keep their project defaults. Relative paths
    /// in the file are resolved against `project_root`.
    ///
    /// [`for_project`]: Self::for_project
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let root = project_root.as_ref();
        let path = root.join(STATE_DIR).join(CONFIG_FILE);
        let defaults = Self::for_project(root);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(defaults);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| GatewayError::Config {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let file: FileConfig = toml::from_str(&content).map_err(|e| GatewayError::Config {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let resolve = |p: PathBuf| if p.is_relative() { root.join(p) } else { p };
        let config = Self {
            ontology_file: file.ontology_file.map(resolve).or(defaults.ontology_file),
            ledger_file: file.ledger_file.map(resolve).or(defaults.ledger_file),
            audit_log: file.audit_log.map(resolve).or(defaults.audit_log),
            grant_ttl_secs: file.grant_ttl_secs,
            authorize_base_url: file
                .authorize_base_url
                .unwrap_or(defaults.authorize_base_url),
            extra_toolkits: file.extra_toolkits,
            deny: file.deny,
            role: file.role,
            approved: file.approved,
            config_path: defaults.config_path,
        };
        tracing::info!(path = %path.display(), "loaded gateway config");
        Ok(config)
    }

    /// Path of the config file this config belongs to.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn config_error(&self, reason: String) -> GatewayError {
        GatewayError::Config {
            path: self.config_path.clone(),
            reason,
        }
    }

    /// The built-in toolkits plus `extra_toolkits`.
    pub fn registry(&self) -> ToolkitRegistry {
        let mut registry = ToolkitRegistry::default();
        registry.extend(self.extra_toolkits.iter().cloned());
        registry
    }

    /// Load the ontology: `explicit` > `$CAPABILITIES_FILE` > `ontology_file`
    /// > embedded default.
    pub fn load_ontology(
        &self,
        explicit: Option<&Path>,
    ) -> Result<CapabilitiesOntology, GatewayError> {
        OntologyLoader::standard(explicit, self.ontology_file.as_deref(), self.registry())
            .load()
            .map_err(GatewayError::Ontology)
    }

    /// Build the consent ledger: file-backed when `ledger_file` is set,
    /// audited when `audit_log` is set, with the configured TTL.
    pub fn build_ledger(
        &self,
        ontology: Arc<CapabilitiesOntology>,
    ) -> Result<ConsentLedger, GatewayError> {
        let mut ledger = match &self.ledger_file {
            Some(path) => {
                let store = FileConsentStore::open(path).map_err(LedgerError::from)?;
                ConsentLedger::new(ontology, store)?
            }
            None => ConsentLedger::in_memory(ontology),
        };

        if let Some(path) = &self.audit_log {
            let log = AuditLog::open(path).map_err(LedgerError::from)?;
            ledger = ledger.with_audit_sink(Arc::new(Mutex::new(log)));
        }

        if let Some(secs) = self.grant_ttl_secs {
            let ttl = i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| {
                    self.config_error(format!("grant_ttl_secs {} is out of range", secs))
                })?;
            ledger = ledger.with_grant_ttl(ttl);
        }

        Ok(ledger)
    }

    /// Assemble the whole gateway: ontology, ledger, URL issuer and the
    /// configured policy layers.
    pub fn build_gateway(
        &self,
        explicit_ontology: Option<&Path>,
    ) -> Result<AuthorizationGateway, GatewayError> {
        let ontology = Arc::new(self.load_ontology(explicit_ontology)?);
        let ledger = Arc::new(self.build_ledger(Arc::clone(&ontology))?);
        let issuer = TemplateUrlIssuer::new(&self.authorize_base_url)?;
        let mut gateway = AuthorizationGateway::new(ledger, issuer);

        let deny =
            DenyList::from_entries(&self.deny, &ontology).map_err(|r| self.config_error(r))?;
        if !deny.is_empty() {
            gateway = gateway.with_layer(deny);
        }

        if let Some(role) = &self.role {
            let policy = RoleToolPolicy::for_role(role)
                .ok_or_else(|| self.config_error(format!("unknown role '{}'", role)))?;
            gateway = gateway.with_layer(policy);

            let mut gate = ApprovalGate::for_role(role)
                .ok_or_else(|| self.config_error(format!("unknown role '{}'", role)))?;
            for entry in &self.approved {
                gate = gate
                    .approve_entry(entry, &ontology)
                    .map_err(|r| self.config_error(r))?;
            }
            if !gate.is_empty() {
                gateway = gateway.with_layer(gate);
            }
        } else if !self.approved.is_empty() {
            return Err(
                self.config_error("'approved' is set but no 'role' is configured".to_string())
            );
        }

        Ok(gateway)
    }
}

/// On-disk shape of `toolgate.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    ontology_file: Option<PathBuf>,
    ledger_file: Option<PathBuf>,
    audit_log: Option<PathBuf>,
    grant_ttl_secs: Option<u64>,
    authorize_base_url: Option<String>,
    extra_toolkits: Vec<String>,
    deny: Vec<String>,
    role: Option<String>,
    approved: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::AuthorizationDecision;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(root: &Path, content: &str) {
        let dir = root.join(STATE_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), content).unwrap();
    }

    #[test]
    fn for_project_uses_state_dir() {
        let config = GatewayConfig::for_project("/proj");
        assert_eq!(
            config.ledger_file.as_deref(),
            Some(Path::new("/proj/.toolgate/consents.json"))
        );
        assert_eq!(
            config.audit_log.as_deref(),
            Some(Path::new("/proj/.toolgate/audit.jsonl"))
        );
        assert_eq!(config.authorize_base_url, "http://localhost:8787/");
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = GatewayConfig::load(dir.path()).unwrap();
        assert_eq!(config, GatewayConfig::for_project(dir.path()));
    }

    #[test]
    fn load_overlays_file_and_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
ledger_file = "state/grants.json"
grant_ttl_secs = 3600
authorize_base_url = "https://consent.example.com/"
extra_toolkits = ["jira"]
deny = ["deploy"]
role = "coder"
approved = ["repo_ci.create_repo"]
"#,
        );
        let config = GatewayConfig::load(dir.path()).unwrap();
        assert_eq!(
            config.ledger_file,
            Some(dir.path().join("state/grants.json"))
        );
        assert_eq!(
            config.audit_log,
            Some(dir.path().join(".toolgate/audit.jsonl"))
        );
        assert_eq!(config.grant_ttl_secs, Some(3600));
        assert_eq!(config.deny, vec!["deploy"]);
        assert_eq!(config.role.as_deref(), Some("coder"));
        assert_eq!(config.approved, vec!["repo_ci.create_repo"]);
        assert!(config.registry().contains("jira"));
        assert!(config.registry().contains("github"));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "grant_ttl_secs = \"soon\"\n");
        assert!(matches!(
            GatewayConfig::load(dir.path()),
            Err(GatewayError::Config { .. })
        ));

        write_config(dir.path(), "no_such_key = 1\n");
        assert!(matches!(
            GatewayConfig::load(dir.path()),
            Err(GatewayError::Config { .. })
        ));
    }

    #[test]
    fn build_gateway_applies_deny_list() {
        let dir = tempdir().unwrap();
        let mut config = GatewayConfig::for_project(dir.path());
        config.deny = vec!["deploy.provision_envs".to_string()];
        let gateway = config.build_gateway(None).unwrap();

        assert!(matches!(
            gateway.authorize("u1", "deploy", "provision_envs").unwrap(),
            AuthorizationDecision::Denied { .. }
        ));
        assert!(gateway
            .authorize("u1", "deploy", "health_checks")
            .unwrap()
            .is_consent_required());
    }

    #[test]
    fn build_gateway_rejects_bad_deny_entry_and_role() {
        let dir = tempdir().unwrap();
        let mut config = GatewayConfig::for_project(dir.path());
        config.deny = vec!["deploy.launch".to_string()];
        assert!(matches!(
            config.build_gateway(None),
            Err(GatewayError::Config { .. })
        ));

        let mut config = GatewayConfig::for_project(dir.path());
        config.role = Some("janitor".to_string());
        assert!(matches!(
            config.build_gateway(None),
            Err(GatewayError::Config { .. })
        ));
    }

    #[test]
    fn config_errors_name_the_project_config_file() {
        let dir = tempdir().unwrap();
        let mut config = GatewayConfig::for_project(dir.path());
        config.role = Some("janitor".to_string());
        match config.build_gateway(None) {
            Err(GatewayError::Config { path, reason }) => {
                assert_eq!(path, dir.path().join(".toolgate/toolgate.toml"));
                assert!(reason.contains("janitor"));
            }
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }

        write_config(dir.path(), "deny = [\"deploy.launch\"]\n");
        let config = GatewayConfig::load(dir.path()).unwrap();
        assert_eq!(
            config.config_path(),
            dir.path().join(".toolgate/toolgate.toml")
        );
        match config.build_gateway(None) {
            Err(GatewayError::Config { path, .. }) => assert_eq!(path, config.config_path()),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn role_installs_approval_gate() {
        let dir = tempdir().unwrap();
        let mut config = GatewayConfig::for_project(dir.path());
        config.role = Some("marketer".to_string());
        let gateway = config.build_gateway(None).unwrap();
        assert!(matches!(
            gateway.authorize("u1", "content", "blog_posts").unwrap(),
            AuthorizationDecision::Denied { .. }
        ));

        config.approved = vec!["content.blog_posts".to_string()];
        let gateway = config.build_gateway(None).unwrap();
        assert!(gateway
            .authorize("u1", "content", "blog_posts")
            .unwrap()
            .is_allowed());

        config.approved = vec!["content.tweets".to_string()];
        assert!(matches!(
            config.build_gateway(None),
            Err(GatewayError::Config { .. })
        ));

        config.role = None;
        config.approved = vec!["content.blog_posts".to_string()];
        assert!(matches!(
            config.build_gateway(None),
            Err(GatewayError::Config { .. })
        ));
    }

    #[test]
    fn build_gateway_rejects_bad_base_url() {
        let dir = tempdir().unwrap();
        let mut config = GatewayConfig::for_project(dir.path());
        config.authorize_base_url = "not a url".to_string();
        assert!(matches!(
            config.build_gateway(None),
            Err(GatewayError::Issuer(_))
        ));
    }

    #[test]
    fn configured_ontology_file_is_used_when_present() {
        let dir = tempdir().unwrap();
        let config = GatewayConfig::for_project(dir.path());
        let path = config.ontology_file.clone().unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{ "capabilities": [ { "key": "ops", "name": "Ops", "description": "",
                "subCapabilities": [ { "key": "page", "name": "Page", "description": "",
                "requiresConsent": true, "toolkits": ["slack"] } ] } ] }"#,
        )
        .unwrap();

        let ontology = config.load_ontology(None).unwrap();
        assert_eq!(ontology.capabilities().len(), 1);
        assert!(ontology.requires_consent("page").unwrap());
    }

    #[test]
    fn durable_ledger_survives_rebuild() {
        let dir = tempdir().unwrap();
        let config = GatewayConfig::for_project(dir.path());

        let gateway = config.build_gateway(None).unwrap();
        gateway.record_consent("u1", "create_repo").unwrap();
        drop(gateway);

        let gateway = config.build_gateway(None).unwrap();
        assert!(gateway
            .authorize("u1", "repo_ci", "create_repo")
            .unwrap()
            .is_allowed());
        assert_eq!(
            AuditLog::verify_chain(config.audit_log.as_ref().unwrap()).unwrap(),
            1
        );
    }
}
