//! Export record builder.
//!
//! Turns typed field structs into `{pk, model, fields}` records and appends
//! them to the output stream. Pks come from the run's
//! [`Registry`](crate::Registry) counters and are only consumed once a record
//! has been built successfully, so a skipped entity never leaves a gap in its
//! kind's sequence.
//!
//! With validation enabled every record is checked for:
//!
//! 1. **Shape**: exactly the three top-level keys, an object `fields`, and a
//!    model name matching its kind.
//! 2. **Losslessness**: the record survives a text round-trip through the
//!    target encoding with every value intact.

pub mod compare;

use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorCode, ExportError};
use crate::model::{EntityKind, Pk};
use crate::registry::Registry;
use compare::first_difference;

/// One element of the export stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub pk: Pk,
    pub model: &'static str,
    pub fields: Value,
    #[serde(skip)]
    pub kind: EntityKind,
}

/// Ordered output stream plus the record factory.
#[derive(Debug, Default)]
pub struct RecordStream {
    validate: bool,
    records: Vec<Record>,
}

impl RecordStream {
    #[must_use]
    pub const fn new(validate: bool) -> Self {
        Self {
            validate,
            records: Vec::new(),
        }
    }

    /// Build a record for an already-known pk without appending it.
    ///
    /// # Errors
    ///
    /// [`ExportError::Abort`] with [`ErrorCode::MalformedRecord`] when the
    /// fields cannot be serialized or fail validation.
    pub fn build<F: Serialize>(
        &self,
        kind: EntityKind,
        pk: Pk,
        fields: &F,
    ) -> Result<Record, ExportError> {
        let fields = serde_json::to_value(fields).map_err(|e| {
            ExportError::abort(
                ErrorCode::MalformedRecord,
                format!("{kind} {pk}: fields failed to serialize: {e}"),
            )
        })?;
        let record = Record {
            pk,
            model: kind.model_name(),
            fields,
            kind,
        };
        if self.validate {
            validate_record(&record)?;
        }
        Ok(record)
    }

    /// Allocate the next pk of `kind`, build the record and append it.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build). On error no pk is consumed.
    pub fn emit<F: Serialize>(
        &mut self,
        registry: &mut Registry,
        kind: EntityKind,
        fields: &F,
    ) -> Result<Pk, ExportError> {
        let pk = registry.next_pk(kind);
        let record = self.build(kind, pk, fields)?;
        registry.allocate(kind);
        self.records.push(record);
        Ok(pk)
    }

    /// Append a record under a pk owned by another record, such as a diff
    /// proposal sharing its proposal's pk.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn emit_at<F: Serialize>(
        &mut self,
        kind: EntityKind,
        pk: Pk,
        fields: &F,
    ) -> Result<(), ExportError> {
        let record = self.build(kind, pk, fields)?;
        self.records.push(record);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Check shape and losslessness of a single record.
///
/// # Errors
///
/// [`ExportError::Abort`] describing the first violation found.
pub fn validate_record(record: &Record) -> Result<(), ExportError> {
    let malformed = |detail: String| {
        ExportError::abort(
            ErrorCode::MalformedRecord,
            format!("{} {}: {detail}", record.model, record.pk),
        )
    };

    let value = serde_json::to_value(record).map_err(|e| malformed(e.to_string()))?;
    let Value::Object(map) = &value else {
        return Err(malformed("record is not an object".into()));
    };
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    if keys != ["fields", "model", "pk"] {
        return Err(malformed(format!("wrong keys in record: {keys:?}")));
    }
    if !record.fields.is_object() {
        return Err(malformed("fields is not an object".into()));
    }
    if record.pk == 0 {
        return Err(malformed("pk must start at 1".into()));
    }
    if record.model != record.kind.model_name() {
        return Err(malformed(format!("model does not match kind {:?}", record.kind)));
    }

    let text = serde_json::to_string(&value).map_err(|e| malformed(e.to_string()))?;
    let reparsed: Value = serde_json::from_str(&text).map_err(|e| malformed(e.to_string()))?;
    if let Some(at) = first_difference(&value, &reparsed) {
        return Err(malformed(format!("{at} does not survive a JSON round-trip")));
    }
    Ok(())
}
