// source.rs - Layered ontology sources.
//
// The ontology is read from the first source that is present, in this order:
//
//   1. an explicit path (CLI flag or API argument)
//   2. the path in the CAPABILITIES_FILE environment variable
//   3. an optionally configured path (e.g. from toolgate.toml)
//   4. the embedded default
//
// Absence falls through to the next source. A source that is present but
// broken (unparseable, invalid) aborts loading, and an explicit path that
// cannot be read is an error rather than a fallback.

use std::path::{Path, PathBuf};

use crate::error::OntologyError;
use crate::model::CapabilitiesOntology;
use crate::toolkit::ToolkitRegistry;

/// Environment variable naming an ontology override file.
pub const CAPABILITIES_FILE_ENV: &str = "CAPABILITIES_FILE";

const EMBEDDED_DEFAULT: &str = include_str!("default_capabilities.json");

/// One provider in the loading chain.
pub trait OntologySource {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// `Ok(None)` means "not present, try the next source".
    fn load(&self, registry: &ToolkitRegistry)
        -> Result<Option<CapabilitiesOntology>, OntologyError>;
}

/// A path the caller asked for by name. Must exist and be readable.
#[derive(Debug, Clone)]
pub struct ExplicitPath(pub PathBuf);

impl OntologySource for ExplicitPath {
    fn describe(&self) -> String {
        format!("explicit path {}", self.0.display())
    }

    fn load(
        &self,
        registry: &ToolkitRegistry,
    ) -> Result<Option<CapabilitiesOntology>, OntologyError> {
        read_file(&self.0, registry).map(Some)
    }
}

/// A path read from an environment variable. Unset or pointing at a
/// non-existent file means absent.
#[derive(Debug, Clone)]
pub struct EnvPath {
    var: String,
}

impl EnvPath {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvPath {
    fn default() -> Self {
        Self::new(CAPABILITIES_FILE_ENV)
    }
}

impl OntologySource for EnvPath {
    fn describe(&self) -> String {
        format!("${}", self.var)
    }

    fn load(
        &self,
        registry: &ToolkitRegistry,
    ) -> Result<Option<CapabilitiesOntology>, OntologyError> {
        let value = match std::env::var_os(&self.var) {
            Some(v) if !v.is_empty() => PathBuf::from(v),
            _ => return Ok(None),
        };
        if !value.exists() {
            tracing::warn!(
                var = %self.var,
                path = %value.display(),
                "capabilities file from environment does not exist, ignoring"
            );
            return Ok(None);
        }
        read_file(&value, registry).map(Some)
    }
}

/// A configured path that is allowed to be missing.
#[derive(Debug, Clone)]
pub struct OptionalPath(pub PathBuf);

impl OntologySource for OptionalPath {
    fn describe(&self) -> String {
        format!("configured path {}", self.0.display())
    }

    fn load(
        &self,
        registry: &ToolkitRegistry,
    ) -> Result<Option<CapabilitiesOntology>, OntologyError> {
        if !self.0.exists() {
            return Ok(None);
        }
        read_file(&self.0, registry).map(Some)
    }
}

/// The ontology compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct Embedded;

impl OntologySource for Embedded {
    fn describe(&self) -> String {
        "embedded default".to_string()
    }

    fn load(
        &self,
        registry: &ToolkitRegistry,
    ) -> Result<Option<CapabilitiesOntology>, OntologyError> {
        default_ontology(registry).map(Some)
    }
}

/// Tries sources in order and returns the first ontology supplied.
///
/// The embedded default always terminates the chain.
pub struct OntologyLoader {
    registry: ToolkitRegistry,
    sources: Vec<Box<dyn OntologySource>>,
}

impl OntologyLoader {
    /// A loader with no override sources (embedded default only).
    pub fn new(registry: ToolkitRegistry) -> Self {
        Self {
            registry,
            sources: Vec::new(),
        }
    }

    /// The standard chain: explicit > `$CAPABILITIES_FILE` > configured > embedded.
    pub fn standard(
        explicit: Option<&Path>,
        configured: Option<&Path>,
        registry: ToolkitRegistry,
    ) -> Self {
        let mut loader = Self::new(registry);
        if let Some(path) = explicit {
            loader = loader.with_source(ExplicitPath(path.to_path_buf()));
        }
        loader = loader.with_source(EnvPath::default());
        if let Some(path) = configured {
            loader = loader.with_source(OptionalPath(path.to_path_buf()));
        }
        loader
    }

    /// Append a source (tried after those already added).
    pub fn with_source(mut self, source: impl OntologySource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn registry(&self) -> &ToolkitRegistry {
        &self.registry
    }

    /// Run the chain.
    pub fn load(&self) -> Result<CapabilitiesOntology, OntologyError> {
        for source in &self.sources {
            if let Some(ontology) = source.load(&self.registry)? {
                tracing::info!(
                    source = %source.describe(),
                    version = %ontology.version(),
                    capabilities = ontology.capabilities().len(),
                    "loaded capabilities ontology"
                );
                return Ok(ontology);
            }
            tracing::debug!(source = %source.describe(), "ontology source absent");
        }

        let ontology = default_ontology(&self.registry)?;
        tracing::info!(
            source = "embedded default",
            version = %ontology.version(),
            "loaded capabilities ontology"
        );
        Ok(ontology)
    }
}

/// Load with the standard chain and the default toolkit registry.
pub fn load(source: Option<&Path>) -> Result<CapabilitiesOntology, OntologyError> {
    OntologyLoader::standard(source, None, ToolkitRegistry::default()).load()
}

/// Parse the embedded default ontology.
pub fn default_ontology(registry: &ToolkitRegistry) -> Result<CapabilitiesOntology, OntologyError> {
    CapabilitiesOntology::from_json_str(EMBEDDED_DEFAULT, registry, "embedded default")
}

/// Read and validate an ontology file. `.yaml`/`.yml` are parsed as YAML,
/// everything else as JSON.
pub fn read_file(
    path: &Path,
    registry: &ToolkitRegistry,
) -> Result<CapabilitiesOntology, OntologyError> {
    let content = std::fs::read_to_string(path).map_err(|source| OntologyError::SourceNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let source_name = path.display().to_string();
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    if is_yaml {
        CapabilitiesOntology::from_yaml_str(&content, registry, &source_name)
    } else {
        CapabilitiesOntology::from_json_str(&content, registry, &source_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CUSTOM: &str = r#"{ "capabilities": [ { "key": "custom", "name": "Custom",
        "description": "", "subCapabilities": [
            { "key": "only_one", "name": "Only", "description": "" } ] } ] }"#;

    #[test]
    fn embedded_default_is_valid() {
        let ontology = default_ontology(&ToolkitRegistry::default()).unwrap();
        let keys: Vec<&str> = ontology
            .capabilities()
            .iter()
            .map(|c| c.key.as_str())
            .collect();
        assert_eq!(
            keys,
            vec!["research", "repo_ci", "deploy", "database", "qa", "comms", "content"]
        );
        let create_repo = ontology.sub_capability("repo_ci", "create_repo").unwrap();
        assert!(create_repo.requires_consent);
        assert_eq!(create_repo.primary_toolkit(), Some("github"));
    }

    #[test]
    fn embedded_default_needs_builtin_toolkits() {
        let err = default_ontology(&ToolkitRegistry::empty()).unwrap_err();
        assert!(matches!(err, OntologyError::Validation { .. }));
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("caps.json");
        fs::write(&path, CUSTOM).unwrap();

        let ontology = OntologyLoader::new(ToolkitRegistry::default())
            .with_source(ExplicitPath(path))
            .load()
            .unwrap();
        assert!(ontology.contains_sub_capability("only_one"));
        assert!(!ontology.contains_sub_capability("create_repo"));
    }

    #[test]
    fn missing_explicit_path_is_not_found() {
        let dir = tempdir().unwrap();
        let err = OntologyLoader::new(ToolkitRegistry::default())
            .with_source(ExplicitPath(dir.path().join("missing.json")))
            .load()
            .unwrap_err();
        assert!(matches!(err, OntologyError::SourceNotFound { .. }));
    }

    #[test]
    fn invalid_explicit_source_does_not_fall_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("caps.json");
        fs::write(&path, "{ not json").unwrap();

        let err = OntologyLoader::new(ToolkitRegistry::default())
            .with_source(ExplicitPath(path))
            .load()
            .unwrap_err();
        assert!(matches!(err, OntologyError::Validation { .. }));
    }

    #[test]
    fn unset_env_var_falls_back_to_default() {
        let ontology = OntologyLoader::new(ToolkitRegistry::default())
            .with_source(EnvPath::new("TG_TEST_CAPS_UNSET"))
            .load()
            .unwrap();
        assert!(ontology.contains_sub_capability("create_repo"));
    }

    #[test]
    fn env_var_to_missing_file_falls_back_to_default() {
        let dir = tempdir().unwrap();
        std::env::set_var("TG_TEST_CAPS_MISSING", dir.path().join("gone.json"));
        let ontology = OntologyLoader::new(ToolkitRegistry::default())
            .with_source(EnvPath::new("TG_TEST_CAPS_MISSING"))
            .load()
            .unwrap();
        assert!(ontology.contains_sub_capability("create_repo"));
    }

    #[test]
    fn env_var_to_existing_file_is_used() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("caps.json");
        fs::write(&path, CUSTOM).unwrap();
        std::env::set_var("TG_TEST_CAPS_PRESENT", &path);

        let ontology = OntologyLoader::new(ToolkitRegistry::default())
            .with_source(EnvPath::new("TG_TEST_CAPS_PRESENT"))
            .load()
            .unwrap();
        assert!(ontology.contains_sub_capability("only_one"));
    }

    #[test]
    fn optional_path_absent_falls_through() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("second.yaml");
        fs::write(
            &present,
            "capabilities:\n  - key: custom\n    name: Custom\n    description: ''\n",
        )
        .unwrap();

        let ontology = OntologyLoader::new(ToolkitRegistry::default())
            .with_source(OptionalPath(dir.path().join("first.json")))
            .with_source(OptionalPath(present))
            .load()
            .unwrap();
        assert_eq!(ontology.capabilities().len(), 1);
        assert_eq!(ontology.capabilities()[0].key, "custom");
    }

    #[test]
    fn unknown_toolkit_in_file_is_validation_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("caps.json");
        fs::write(
            &path,
            r#"{ "capabilities": [ { "key": "a", "name": "A", "description": "",
                "subCapabilities": [ { "key": "s", "name": "S", "description": "",
                                       "toolkits": ["friendster"] } ] } ] }"#,
        )
        .unwrap();

        let err = read_file(&path, &ToolkitRegistry::default()).unwrap_err();
        assert!(matches!(err, OntologyError::Validation { .. }));
    }
}
