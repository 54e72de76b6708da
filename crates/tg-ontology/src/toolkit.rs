// toolkit.rs - Recognized toolkits and toolkit resolution.
//
// A toolkit is an external integration (GitHub, Slack, Vercel, ...) that a
// sub-capability may invoke. The registry is the closed set of toolkit ids
// the deployment knows how to authorize; ontology loading rejects anything
// outside it.

use std::collections::BTreeSet;

use crate::error::OntologyError;
use crate::model::CapabilitiesOntology;

/// Toolkits recognized out of the box.
pub const DEFAULT_TOOLKITS: &[&str] = &[
    "github", "linkedin", "x", "vercel", "render", "fly", "slack", "google",
];

/// The set of toolkit identifiers the resolver recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolkitRegistry {
    toolkits: BTreeSet<String>,
}

impl ToolkitRegistry {
    /// A registry that recognizes nothing.
    pub fn empty() -> Self {
        Self {
            toolkits: BTreeSet::new(),
        }
    }

    /// Add a toolkit and return self (builder pattern).
    pub fn with_toolkit(mut self, id: impl Into<String>) -> Self {
        self.toolkits.insert(id.into());
        self
    }

    /// Add several toolkits, e.g. from deployment configuration.
    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.toolkits.extend(ids.into_iter().map(Into::into));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.toolkits.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.toolkits.iter().map(String::as_str)
    }
}

impl Default for ToolkitRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.extend(DEFAULT_TOOLKITS.iter().copied());
        registry
    }
}

impl CapabilitiesOntology {
    /// Union of the toolkits needed by every named sub-capability.
    ///
    /// The result is a set; callers must not rely on its ordering. Fails with
    /// `UnknownSubCapability` if any key is absent from the ontology.
    pub fn resolve_toolkits<I, S>(&self, sub_capability_keys: I) -> Result<BTreeSet<String>, OntologyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = BTreeSet::new();
        for key in sub_capability_keys {
            let key = key.as_ref();
            let mut found = false;
            for (_, sub) in self.find_sub_capabilities(key) {
                found = true;
                resolved.extend(sub.toolkits.iter().cloned());
            }
            if !found {
                return Err(OntologyError::UnknownSubCapability {
                    key: key.to_string(),
                });
            }
        }
        tracing::debug!(toolkits = ?resolved, "resolved toolkits");
        Ok(resolved)
    }
}
