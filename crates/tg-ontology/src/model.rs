// model.rs - Capability ontology data model.
//
// The ontology is a two-level hierarchy: capabilities (permission domains
// such as "deploy") contain sub-capabilities (grantable actions such as
// "provision_envs"). Each sub-capability says whether it needs explicit
// user consent and which external toolkits it may invoke.
//
// A `CapabilitiesOntology` can only be built through validation, so every
// instance in the process satisfies the key-uniqueness and known-toolkit
// invariants. It has no mutating methods; share it behind an `Arc`.

use std::collections::HashSet;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::OntologyError;
use crate::toolkit::ToolkitRegistry;

/// A specific grantable action within a capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubCapability {
    /// Stable identifier, unique within the parent capability.
    pub key: String,
    /// Display name.
    pub name: String,
    pub description: String,
    /// Whether the subject must explicitly consent before this is used.
    #[serde(default)]
    pub requires_consent: bool,
    /// Toolkits this sub-capability may invoke. A set: duplicates collapse,
    /// declaration order is kept for display only.
    #[serde(default)]
    pub toolkits: IndexSet<String>,
}

impl SubCapability {
    /// The toolkit used to key the authorization URL (first declared).
    pub fn primary_toolkit(&self) -> Option<&str> {
        self.toolkits.first().map(String::as_str)
    }
}

/// A top-level permission domain (e.g. "Deploy").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// Stable identifier, unique across the ontology.
    pub key: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub sub_capabilities: Vec<SubCapability>,
}

impl Capability {
    /// Find a sub-capability of this capability by key.
    pub fn sub_capability(&self, key: &str) -> Option<&SubCapability> {
        self.sub_capabilities.iter().find(|s| s.key == key)
    }
}

/// The raw, unvalidated shape of an ontology source file.
///
/// ```json
/// { "capabilities": [ { "key": "repo_ci", "name": "Repo/CI", "description": "...",
///     "subCapabilities": [ { "key": "create_repo", "name": "Create repo",
///       "description": "...", "requiresConsent": true, "toolkits": ["github"] } ] } ] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OntologyDocument {
    pub capabilities: Vec<Capability>,
}

/// Result of [`CapabilitiesOntology::lookup`]: a capability when only the
/// capability key was given, a sub-capability when both were.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Capability(&'a Capability),
    SubCapability(&'a SubCapability),
}

/// The validated, read-only capability hierarchy.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CapabilitiesOntology {
    capabilities: Vec<Capability>,
    #[serde(skip)]
    version: String,
}

impl CapabilitiesOntology {
    /// Validate a document against the toolkit registry and freeze it.
    ///
    /// `source_name` is only used to label validation errors.
    pub fn from_document(
        document: OntologyDocument,
        registry: &ToolkitRegistry,
        source_name: &str,
    ) -> Result<Self, OntologyError> {
        validate(&document, registry, source_name)?;
        let canonical = serde_json::to_string(&document)
            .map_err(|e| OntologyError::validation(source_name, e.to_string()))?;
        let version = format!("{:x}", Sha256::digest(canonical.as_bytes()));
        Ok(Self {
            capabilities: document.capabilities,
            version,
        })
    }

    /// Parse and validate a JSON source.
    pub fn from_json_str(
        content: &str,
        registry: &ToolkitRegistry,
        source_name: &str,
    ) -> Result<Self, OntologyError> {
        let document: OntologyDocument = serde_json::from_str(content)
            .map_err(|e| OntologyError::validation(source_name, e.to_string()))?;
        Self::from_document(document, registry, source_name)
    }

    /// Parse and validate a YAML source.
    pub fn from_yaml_str(
        content: &str,
        registry: &ToolkitRegistry,
        source_name: &str,
    ) -> Result<Self, OntologyError> {
        let document: OntologyDocument = serde_yaml::from_str(content)
            .map_err(|e| OntologyError::validation(source_name, e.to_string()))?;
        Self::from_document(document, registry, source_name)
    }

    /// All capabilities in declaration order.
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Hex SHA-256 of the canonical JSON form. Two ontologies with the same
    /// content have the same version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Look up a capability, or one of its sub-capabilities when
    /// `sub_capability_key` is given.
    pub fn lookup(
        &self,
        capability_key: &str,
        sub_capability_key: Option<&str>,
    ) -> Result<Lookup<'_>, OntologyError> {
        match sub_capability_key {
            None => self.capability(capability_key).map(Lookup::Capability),
            Some(sub_key) => self
                .sub_capability(capability_key, sub_key)
                .map(Lookup::SubCapability),
        }
    }

    /// Look up a capability by key.
    pub fn capability(&self, key: &str) -> Result<&Capability, OntologyError> {
        self.capabilities
            .iter()
            .find(|c| c.key == key)
            .ok_or_else(|| OntologyError::CapabilityNotFound {
                key: key.to_string(),
            })
    }

    /// Look up a sub-capability by its full path.
    pub fn sub_capability(
        &self,
        capability_key: &str,
        sub_capability_key: &str,
    ) -> Result<&SubCapability, OntologyError> {
        self.capability(capability_key)?
            .sub_capability(sub_capability_key)
            .ok_or_else(|| OntologyError::SubCapabilityNotFound {
                capability_key: capability_key.to_string(),
                sub_capability_key: sub_capability_key.to_string(),
            })
    }

    /// Every sub-capability declaring `key`, across all capabilities.
    ///
    /// Sub-capability keys are only unique within their capability, so the
    /// ledger and resolver (which address sub-capabilities by key alone)
    /// consider all matches.
    pub fn find_sub_capabilities<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Iterator<Item = (&'a Capability, &'a SubCapability)> + 'a {
        self.capabilities.iter().flat_map(move |capability| {
            capability
                .sub_capabilities
                .iter()
                .filter(move |sub| sub.key == key)
                .map(move |sub| (capability, sub))
        })
    }

    /// Whether any capability declares a sub-capability with this key.
    pub fn contains_sub_capability(&self, key: &str) -> bool {
        self.find_sub_capabilities(key).next().is_some()
    }

    /// Whether the sub-capability `key` needs explicit consent.
    ///
    /// When several capabilities share the key, consent is required if any
    /// of them requires it.
    pub fn requires_consent(&self, key: &str) -> Result<bool, OntologyError> {
        let mut found = false;
        for (_, sub) in self.find_sub_capabilities(key) {
            if sub.requires_consent {
                return Ok(true);
            }
            found = true;
        }
        if found {
            Ok(false)
        } else {
            Err(OntologyError::UnknownSubCapability {
                key: key.to_string(),
            })
        }
    }

    /// Convert back into the raw document shape (for display and export).
    pub fn to_document(&self) -> OntologyDocument {
        OntologyDocument {
            capabilities: self.capabilities.clone(),
        }
    }
}

fn validate(
    document: &OntologyDocument,
    registry: &ToolkitRegistry,
    source_name: &str,
) -> Result<(), OntologyError> {
    let mut capability_keys = HashSet::new();

    for (index, capability) in document.capabilities.iter().enumerate() {
        let where_ = format!("capabilities[{}]", index);
        require_non_empty(source_name, &where_, "key", &capability.key)?;
        require_non_empty(source_name, &where_, "name", &capability.name)?;

        if !capability_keys.insert(capability.key.as_str()) {
            return Err(OntologyError::validation(
                source_name,
                format!("duplicate capability key '{}'", capability.key),
            ));
        }

        let mut sub_keys = HashSet::new();
        for (sub_index, sub) in capability.sub_capabilities.iter().enumerate() {
            let where_ = format!("{}.subCapabilities[{}]", capability.key, sub_index);
            require_non_empty(source_name, &where_, "key", &sub.key)?;
            require_non_empty(source_name, &where_, "name", &sub.name)?;

            if !sub_keys.insert(sub.key.as_str()) {
                return Err(OntologyError::validation(
                    source_name,
                    format!(
                        "duplicate sub-capability key '{}' in capability '{}'",
                        sub.key, capability.key
                    ),
                ));
            }

            if let Some(unknown) = sub.toolkits.iter().find(|t| !registry.contains(t)) {
                return Err(OntologyError::validation(
                    source_name,
                    format!(
                        "sub-capability '{}.{}' references unknown toolkit '{}'",
                        capability.key, sub.key, unknown
                    ),
                ));
            }
        }
    }

    Ok(())
}

fn require_non_empty(
    source_name: &str,
    location: &str,
    field: &str,
    value: &str,
) -> Result<(), OntologyError> {
    if value.trim().is_empty() {
        return Err(OntologyError::validation(
            source_name,
            format!("{}: required field '{}' is empty", location, field),
        ));
    }
    Ok(())
}
