//! ferry-core library.
//!
//! Migrates a legacy meeting/voting snapshot into a flat stream of
//! `{pk, model, fields}` records. The pipeline is single-pass: primary keys
//! are handed out in traversal order, so traversal order is part of the
//! output contract.
//!
//! # Conventions
//!
//! - **Errors**: recoverable vs. critical conditions travel as
//!   [`error::ExportError`]; application-level failures use `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod builder;
pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod pipeline;
pub mod register;
pub mod registry;
pub mod richtext;
pub mod source;
pub mod tags;
pub mod transcode;

pub use builder::{Record, RecordStream};
pub use config::ExportConfig;
pub use error::{Diagnostic, ErrorCode, ExportError};
pub use ledger::{DedupMode, Ledger};
pub use model::{EntityKind, Pk};
pub use pipeline::{ExportOutcome, export};
pub use registry::{Registry, RegistryError};
pub use source::SourceTree;
