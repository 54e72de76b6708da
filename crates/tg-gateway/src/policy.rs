// policy.rs - Deployment policy layers.
//
// The base gateway never denies: it allows, or asks for consent. Deployments
// that need hard refusals stack policy layers in front of the consent check.
// Each layer either passes or returns a denial reason; the first denial wins.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use tg_ontology::{CapabilitiesOntology, SubCapability};

use crate::gateway::AccessRequest;

/// A deny-only check run before the consent ledger is consulted.
pub trait PolicyLayer: Send + Sync {
    /// Short name used in evaluation traces.
    fn name(&self) -> &str;

    /// `Some(reason)` to deny, `None` to pass.
    fn check(&self, request: &AccessRequest<'_>, sub_capability: &SubCapability) -> Option<String>;
}

/// Explicitly forbidden capabilities or sub-capabilities.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    capabilities: HashSet<String>,
    sub_capabilities: HashSet<(String, String)>,
}

impl DenyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny every sub-capability of a capability.
    pub fn deny_capability(mut self, capability_key: impl Into<String>) -> Self {
        self.capabilities.insert(capability_key.into());
        self
    }

    /// Deny one sub-capability.
    pub fn deny_sub_capability(
        mut self,
        capability_key: impl Into<String>,
        sub_capability_key: impl Into<String>,
    ) -> Self {
        self.sub_capabilities
            .insert((capability_key.into(), sub_capability_key.into()));
        self
    }

    /// Parse entries of the form `capability` or `capability.sub_capability`,
    /// checking each against the ontology so a typo is reported instead of
    /// silently denying nothing.
    pub fn from_entries<I, S>(entries: I, ontology: &CapabilitiesOntology) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            match entry.split_once('.') {
                Some((capability, sub)) => {
                    ontology
                        .sub_capability(capability, sub)
                        .map_err(|e| format!("deny entry '{}': {}", entry, e))?;
                    list = list.deny_sub_capability(capability, sub);
                }
                None => {
                    ontology
                        .capability(entry)
                        .map_err(|e| format!("deny entry '{}': {}", entry, e))?;
                    list = list.deny_capability(entry);
                }
            }
        }
        Ok(list)
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.sub_capabilities.is_empty()
    }
}

impl PolicyLayer for DenyList {
    fn name(&self) -> &str {
        "deny_list"
    }

    fn check(&self, request: &AccessRequest<'_>, _sub: &SubCapability) -> Option<String> {
        if self.capabilities.contains(request.capability_key) {
            return Some(format!(
                "capability '{}' is deny-listed",
                request.capability_key
            ));
        }
        let pair = (
            request.capability_key.to_string(),
            request.sub_capability_key.to_string(),
        );
        if self.sub_capabilities.contains(&pair) {
            return Some(format!(
                "sub-capability '{}.{}' is deny-listed",
                request.capability_key, request.sub_capability_key
            ));
        }
        None
    }
}

/// Toolkits each agent role may use, mirroring least-privilege role setups:
/// a coder agent gets GitHub, a publisher gets the deploy targets, and so on.
pub fn default_role_toolkits() -> BTreeMap<String, BTreeSet<String>> {
    let table: &[(&str, &[&str])] = &[
        ("orchestrator", &[]),
        ("researcher", &["google"]),
        ("architect", &[]),
        ("coder", &["github"]),
        ("qa", &["github"]),
        ("publisher", &["vercel", "render", "fly"]),
        ("marketer", &["google", "slack"]),
    ];
    table
        .iter()
        .map(|(role, toolkits)| {
            (
                role.to_string(),
                toolkits.iter().map(|t| t.to_string()).collect(),
            )
        })
        .collect()
}

/// Denies sub-capabilities that need a toolkit outside the acting role's set.
///
/// Sub-capabilities with no toolkits are internal and always pass.
#[derive(Debug, Clone)]
pub struct RoleToolPolicy {
    role: String,
    toolkits: BTreeSet<String>,
}

impl RoleToolPolicy {
    pub fn new(role: impl Into<String>, toolkits: BTreeSet<String>) -> Self {
        Self {
            role: role.into(),
            toolkits,
        }
    }

    /// Policy for one of the [`default_role_toolkits`] roles.
    pub fn for_role(role: &str) -> Option<Self> {
        default_role_toolkits()
            .remove(role)
            .map(|toolkits| Self::new(role, toolkits))
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

impl PolicyLayer for RoleToolPolicy {
    fn name(&self) -> &str {
        "role_toolkits"
    }

    fn check(&self, _request: &AccessRequest<'_>, sub: &SubCapability) -> Option<String> {
        let outside: Vec<&str> = sub
            .toolkits
            .iter()
            .filter(|t| !self.toolkits.contains(*t))
            .map(String::as_str)
            .collect();
        if outside.is_empty() {
            None
        } else {
            Some(format!(
                "role '{}' may not use toolkit(s) {} required by '{}'",
                self.role,
                outside.join(", "),
                sub.key
            ))
        }
    }
}

/// Kinds of action an agent role may need a human's sign-off for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SensitiveAction {
    Delete,
    Rollback,
    Revoke,
    ExternalPost,
}

impl SensitiveAction {
    pub const ALL: [SensitiveAction; 4] = [
        SensitiveAction::Delete,
        SensitiveAction::Rollback,
        SensitiveAction::Revoke,
        SensitiveAction::ExternalPost,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            SensitiveAction::Delete => &["delete", "remove"],
            SensitiveAction::Rollback => &["rollback", "revert"],
            SensitiveAction::Revoke => &["revoke", "disconnect"],
            SensitiveAction::ExternalPost => &["post", "publish", "send"],
        }
    }

    /// Whether a sub-capability looks like this action, judged by keywords
    /// in its key or display name.
    pub fn matches(self, sub: &SubCapability) -> bool {
        let key = sub.key.to_lowercase();
        let name = sub.name.to_lowercase();
        self.keywords()
            .iter()
            .any(|word| key.contains(word) || name.contains(word))
    }
}

impl fmt::Display for SensitiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensitiveAction::Delete => "delete",
            SensitiveAction::Rollback => "rollback",
            SensitiveAction::Revoke => "revoke",
            SensitiveAction::ExternalPost => "external_post",
        };
        write!(f, "{}", s)
    }
}

/// Sensitive actions each agent role must have approved before use.
pub fn default_role_approvals() -> BTreeMap<String, BTreeSet<SensitiveAction>> {
    use SensitiveAction::*;
    let table: &[(&str, &[SensitiveAction])] = &[
        ("orchestrator", &[Delete, Rollback, Revoke, ExternalPost]),
        ("researcher", &[]),
        ("architect", &[]),
        ("coder", &[Delete, Revoke]),
        ("qa", &[]),
        ("publisher", &[Rollback, Delete]),
        ("marketer", &[ExternalPost]),
    ];
    table
        .iter()
        .map(|(role, actions)| (role.to_string(), actions.iter().copied().collect()))
        .collect()
}

/// Denies sensitive actions gated for the acting role unless the exact
/// sub-capability has been approved.
///
/// Consent says the subject lets the agent use a toolkit; approval says a
/// human signed off on this particular destructive or outward-facing step.
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    role: String,
    gated: BTreeSet<SensitiveAction>,
    approved: HashSet<(String, String)>,
}

impl ApprovalGate {
    pub fn new(role: impl Into<String>, gated: BTreeSet<SensitiveAction>) -> Self {
        Self {
            role: role.into(),
            gated,
            approved: HashSet::new(),
        }
    }

    /// Gate for one of the [`default_role_approvals`] roles.
    pub fn for_role(role: &str) -> Option<Self> {
        default_role_approvals()
            .remove(role)
            .map(|gated| Self::new(role, gated))
    }

    /// Mark one sub-capability as approved.
    pub fn with_approved(
        mut self,
        capability_key: impl Into<String>,
        sub_capability_key: impl Into<String>,
    ) -> Self {
        self.approved
            .insert((capability_key.into(), sub_capability_key.into()));
        self
    }

    /// Approve a `capability.sub_capability` entry, checking it against the
    /// ontology.
    pub fn approve_entry(
        self,
        entry: &str,
        ontology: &CapabilitiesOntology,
    ) -> Result<Self, String> {
        let entry = entry.trim();
        let (capability, sub) = entry.split_once('.').ok_or_else(|| {
            format!(
                "approved entry '{}' must be 'capability.sub_capability'",
                entry
            )
        })?;
        ontology
            .sub_capability(capability, sub)
            .map_err(|e| format!("approved entry '{}': {}", entry, e))?;
        Ok(self.with_approved(capability, sub))
    }

    /// True when the role gates no actions at all.
    pub fn is_empty(&self) -> bool {
        self.gated.is_empty()
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

impl PolicyLayer for ApprovalGate {
    fn name(&self) -> &str {
        "approval_gate"
    }

    fn check(&self, request: &AccessRequest<'_>, sub: &SubCapability) -> Option<String> {
        let pair = (
            request.capability_key.to_string(),
            request.sub_capability_key.to_string(),
        );
        if self.approved.contains(&pair) {
            return None;
        }
        self.gated
            .iter()
            .find(|action| action.matches(sub))
            .map(|action| {
                format!(
                    "role '{}' needs approval for '{}' on '{}.{}'",
                    self.role, action, request.capability_key, request.sub_capability_key
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_ontology::{default_ontology, ToolkitRegistry};

    fn ontology() -> CapabilitiesOntology {
        default_ontology(&ToolkitRegistry::default()).unwrap()
    }

    fn request<'a>(capability: &'a str, sub: &'a str) -> AccessRequest<'a> {
        AccessRequest {
            subject_id: "u1",
            capability_key: capability,
            sub_capability_key: sub,
        }
    }

    #[test]
    fn deny_list_matches_capability_and_pair() {
        let ontology = ontology();
        let list = DenyList::from_entries(["deploy", "repo_ci.create_repo"], &ontology).unwrap();

        let sub = ontology.sub_capability("deploy", "health_checks").unwrap();
        assert!(list.check(&request("deploy", "health_checks"), sub).is_some());

        let sub = ontology.sub_capability("repo_ci", "create_repo").unwrap();
        assert!(list.check(&request("repo_ci", "create_repo"), sub).is_some());

        let sub = ontology.sub_capability("repo_ci", "trigger_ci").unwrap();
        assert!(list.check(&request("repo_ci", "trigger_ci"), sub).is_none());
    }

    #[test]
    fn deny_list_rejects_unknown_entries() {
        let ontology = ontology();
        let err = DenyList::from_entries(["repo_ci.launch"], &ontology).unwrap_err();
        assert!(err.contains("repo_ci.launch"));
        assert!(DenyList::from_entries(["nope"], &ontology).is_err());
        assert!(DenyList::from_entries(Vec::<String>::new(), &ontology)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn coder_role_is_limited_to_github() {
        let ontology = ontology();
        let policy = RoleToolPolicy::for_role("coder").unwrap();

        let sub = ontology.sub_capability("repo_ci", "create_repo").unwrap();
        assert!(policy.check(&request("repo_ci", "create_repo"), sub).is_none());

        let sub = ontology.sub_capability("deploy", "provision_envs").unwrap();
        let reason = policy
            .check(&request("deploy", "provision_envs"), sub)
            .unwrap();
        assert!(reason.contains("vercel, render, fly"));

        // No toolkits: internal, always passes.
        let sub = ontology.sub_capability("database", "create_db").unwrap();
        assert!(policy.check(&request("database", "create_db"), sub).is_none());
    }

    #[test]
    fn unknown_role_has_no_default_policy() {
        assert!(RoleToolPolicy::for_role("janitor").is_none());
        assert_eq!(RoleToolPolicy::for_role("qa").unwrap().role(), "qa");
    }
    #[test]
    fn marketer_needs_approval_to_post() {
        let ontology = ontology();
        let gate = ApprovalGate::for_role("marketer").unwrap();

        let sub = ontology.sub_capability("content", "blog_posts").unwrap();
        let reason = gate.check(&request("content", "blog_posts"), sub).unwrap();
        assert!(reason.contains("external_post"));
        assert!(reason.contains("content.blog_posts"));

        let sub = ontology.sub_capability("comms", "send_updates").unwrap();
        assert!(gate.check(&request("comms", "send_updates"), sub).is_some());

        let sub = ontology.sub_capability("content", "landing_copy").unwrap();
        assert!(gate.check(&request("content", "landing_copy"), sub).is_none());

        let gate = gate.approve_entry("content.blog_posts", &ontology).unwrap();
        let sub = ontology.sub_capability("content", "blog_posts").unwrap();
        assert!(gate.check(&request("content", "blog_posts"), sub).is_none());
    }

    #[test]
    fn approval_matches_display_name_too() {
        let sub = SubCapability {
            key: "cleanup".to_string(),
            name: "Remove stale branches".to_string(),
            description: String::new(),
            requires_consent: false,
            toolkits: Default::default(),
        };
        assert!(SensitiveAction::Delete.matches(&sub));
        assert!(!SensitiveAction::Rollback.matches(&sub));

        let gate = ApprovalGate::for_role("coder").unwrap();
        assert!(gate.check(&request("repo_ci", "cleanup"), &sub).is_some());
        let gate = ApprovalGate::for_role("researcher").unwrap();
        assert!(gate.is_empty());
        assert!(gate.check(&request("repo_ci", "cleanup"), &sub).is_none());
    }

    #[test]
    fn coder_gate_passes_default_ontology() {
        let ontology = ontology();
        let gate = ApprovalGate::for_role("coder").unwrap();
        for capability in ontology.capabilities() {
            for sub in &capability.sub_capabilities {
                assert!(gate
                    .check(&request(&capability.key, &sub.key), sub)
                    .is_none());
            }
        }
    }

    #[test]
    fn approved_entries_are_validated() {
        let ontology = ontology();
        let gate = ApprovalGate::for_role("marketer").unwrap();
        assert!(gate.clone().approve_entry("blog_posts", &ontology).is_err());
        let err = gate.approve_entry("content.tweets", &ontology).unwrap_err();
        assert!(err.contains("content.tweets"));
        assert!(ApprovalGate::for_role("janitor").is_none());
    }
}
