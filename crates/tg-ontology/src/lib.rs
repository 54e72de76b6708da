//! # tg-ontology
//!
//! Capability ontology for Toolgate.
//!
//! Describes what an agent may do as a two-level hierarchy of
//! [`Capability`] and [`SubCapability`], which sub-capabilities need explicit
//! user consent, and which external toolkits implement them.
//!
//! ## Key invariants
//!
//! - **Validated on load**: capability keys are unique, sub-capability keys
//!   are unique within their capability, every toolkit is in the
//!   [`ToolkitRegistry`]. A [`CapabilitiesOntology`] that exists is valid.
//! - **Read-only**: the ontology has no mutating methods and is shared
//!   behind an `Arc` for the life of the process.
//! - **Loud overrides**: a missing optional override falls back to the
//!   embedded default; an explicit path that is unreadable, or any source
//!   that is invalid, fails loading.
//!
//! ```rust
//! use tg_ontology::{load, Lookup};
//!
//! let ontology = load(None).unwrap();
//! let toolkits = ontology.resolve_toolkits(["branches_prs", "trigger_ci"]).unwrap();
//! assert!(toolkits.contains("github"));
//! assert!(matches!(ontology.lookup("deploy", None), Ok(Lookup::Capability(_))));
//! ```

pub mod error;
pub mod model;
pub mod source;
pub mod toolkit;

pub use error::OntologyError;
pub use model::{CapabilitiesOntology, Capability, Lookup, OntologyDocument, SubCapability};
pub use source::{
    default_ontology, load, read_file, Embedded, EnvPath, ExplicitPath, OntologyLoader,
    OntologySource, OptionalPath, CAPABILITIES_FILE_ENV,
};
pub use toolkit::{ToolkitRegistry, DEFAULT_TOOLKITS};
