//! Electoral register deduplication.
//!
//! Closed polls in one meeting usually share the same electorate. Each
//! candidate register is reduced to a canonical key, the sorted list of
//! `(user pk, weight)` pairs, and a register is only emitted the first time
//! its key shows up. Later polls with the same key are linked to the register
//! already in the stream. Creation timestamps take no part in the key.

use std::collections::HashMap;

use tracing::debug;

use crate::builder::RecordStream;
use crate::error::ExportError;
use crate::model::fields::{ElectoralRegisterFields, PollFields, VoterWeightFields};
use crate::model::{EntityKind, Pk};
use crate::registry::Registry;
use crate::source::Timestamp;

/// Canonical register identity.
pub type RegisterKey = Vec<(Pk, u32)>;

/// Where a register's electorate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSource {
    /// A register snapshot taken in the legacy meeting.
    Snapshot,
    /// Rebuilt from the votes cast in a closed poll.
    Votes,
}

impl RegisterSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "v3_er_export",
            Self::Votes => "v3_voters_export",
        }
    }
}

/// A register that has not been emitted yet.
#[derive(Debug, Clone, Copy)]
pub struct PendingRegister {
    pub created: Option<Timestamp>,
    pub meeting: Pk,
    pub source: RegisterSource,
}

/// Per-meeting register cache.
#[derive(Debug, Default)]
pub struct RegisterDedup {
    seen: HashMap<RegisterKey, Pk>,
}

impl RegisterDedup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted `(user, weight)` pairs; order of `weights` does not matter.
    #[must_use]
    pub fn key(weights: &[(Pk, u32)]) -> RegisterKey {
        let mut key = weights.to_vec();
        key.sort_unstable();
        key
    }

    /// Remember a register that was emitted unconditionally. Only the first
    /// register with a given key is kept.
    pub fn track_original(&mut self, register_pk: Pk, weights: &[(Pk, u32)]) {
        self.seen.entry(Self::key(weights)).or_insert(register_pk);
    }

    /// Pk of an already emitted register with this electorate.
    #[must_use]
    pub fn lookup(&self, weights: &[(Pk, u32)]) -> Option<Pk> {
        self.seen.get(&Self::key(weights)).copied()
    }

    /// Link `poll` to an existing register with the same electorate, or emit
    /// `candidate` with its voter weights and link to that.
    ///
    /// Returns `true` when a new register was appended to `stream`.
    ///
    /// # Errors
    ///
    /// Propagates record build failures from the stream.
    pub fn register_or_reuse(
        &mut self,
        poll: &mut PollFields,
        candidate: PendingRegister,
        weights: &[(Pk, u32)],
        registry: &mut Registry,
        stream: &mut RecordStream,
    ) -> Result<bool, ExportError> {
        let key = Self::key(weights);
        if let Some(&pk) = self.seen.get(&key) {
            debug!(register = pk, voters = key.len(), "reusing electoral register");
            poll.electoral_register = Some(pk);
            return Ok(false);
        }
        let pk = emit_register(candidate, &key, registry, stream)?;
        self.seen.insert(key, pk);
        poll.electoral_register = Some(pk);
        Ok(true)
    }
}

/// Append a register and one voter-weight row per pair, in key order.
///
/// # Errors
///
/// Propagates record build failures from the stream.
pub fn emit_register(
    register: PendingRegister,
    weights: &[(Pk, u32)],
    registry: &mut Registry,
    stream: &mut RecordStream,
) -> Result<Pk, ExportError> {
    let register_pk = stream.emit(
        registry,
        EntityKind::ElectoralRegister,
        &ElectoralRegisterFields {
            created: register.created,
            meeting: register.meeting,
            source: register.source.as_str(),
        },
    )?;
    for &(user, weight) in &RegisterDedup::key(weights) {
        stream.emit(
            registry,
            EntityKind::VoterWeight,
            &VoterWeightFields {
                register: register_pk,
                user,
                weight,
            },
        )?;
    }
    Ok(register_pk)
}
