//! Shared primitive types used across the entire pipeline.

/// ABI bank code (codicebanca).
pub type BankCode = String;

/// Customer identifier (ndg / ndgprincipale).
pub type CustomerId = String;

/// Literal tag of the reporting office (ufficio) attached to output rows.
pub type Office = String;

/// The canonical run identifier.
pub type RunId = String;
