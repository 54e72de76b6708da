pub mod audit;
pub mod authorize;
pub mod consent;
pub mod ontology;
pub mod resolve;
