//! Target-schema types: entity kinds and the typed field maps of each record.

pub mod fields;
pub mod kind;

pub use kind::EntityKind;

/// Sequential primary key, unique per [`EntityKind`] within one run.
pub type Pk = u64;
