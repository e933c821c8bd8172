//! The single-pass export pipeline.
//!
//! One [`Exporter`] owns every piece of mutable run state: the registry and
//! its pk counters, the record stream, the error ledger, and the tag table.
//! The source tree is walked once, meeting by meeting, in the order it was
//! loaded. Users are pre-assigned pks up front and prepended to the stream at
//! the end, keeping only the ones something referenced.

mod agenda;
mod meeting;
mod poll;
mod speakers;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::builder::{Record, RecordStream};
use crate::config::ExportConfig;
use crate::error::{Diagnostic, ErrorCode, ExportError, Halt};
use crate::ledger::Ledger;
use crate::model::fields::{OrganisationFields, UserFields};
use crate::model::{EntityKind, Pk};
use crate::registry::Registry;
use crate::richtext::RichText;
use crate::source::{Organisation, SourceTree, Timestamp, User};
use crate::tags::TagTable;

use meeting::MeetingScope;

/// Result of one run: the ordered records plus everything the operator needs
/// to decide whether they may be written.
#[derive(Debug)]
pub struct ExportOutcome {
    pub records: Vec<Record>,
    pub ledger: Ledger,
    /// `(long, truncated)` tag renames.
    pub truncated_tags: Vec<(String, String)>,
    /// Users that nothing in the exported meetings referenced.
    pub skipped_users: Vec<String>,
    /// Set when `die_on_critical` stopped the walk early.
    pub halted: Option<Halt>,
}

impl ExportOutcome {
    /// A critical diagnostic (or an early halt) makes the batch unwritable.
    #[must_use]
    pub fn has_critical(&self) -> bool {
        self.halted.is_some() || self.ledger.has_critical()
    }

    /// Record count per model name.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.model).or_insert(0) += 1;
        }
        counts
    }

    pub fn records_of(&self, kind: EntityKind) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |record| record.kind == kind)
    }

    /// The export as one JSON array.
    ///
    /// # Errors
    ///
    /// Only if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.records).context("Failed to encode export records")
    }

    /// Write the export file. Refuses to write a batch with critical
    /// diagnostics.
    ///
    /// # Errors
    ///
    /// Fails on critical diagnostics or when the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if self.has_critical() {
            anyhow::bail!(
                "{} critical error types - won't write {}",
                self.ledger.critical_kinds().len().max(1),
                path.display()
            );
        }
        let text = self.to_json()?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), records = self.records.len(), "wrote export");
        Ok(())
    }
}

/// Run the whole export over `tree`.
///
/// Diagnostics never surface as errors here: they are collected in the
/// returned ledger. The `Err` case is reserved for setup failures.
///
/// # Errors
///
/// Fails only if the run context cannot be set up.
pub fn export(tree: &SourceTree, config: &ExportConfig) -> Result<ExportOutcome> {
    let mut exporter = Exporter::new(config)?;
    let halted = exporter.run(tree).err();
    if let Some(halt) = &halted {
        warn!(path = %halt.path, "export halted: {}", halt.diagnostic);
    }
    Ok(exporter.finish(halted))
}

#[derive(Debug, Clone)]
struct Profile {
    name: String,
    created: Timestamp,
    modified: Timestamp,
}

/// Run context threaded through every export step.
struct Exporter<'a> {
    config: &'a ExportConfig,
    registry: Registry,
    stream: RecordStream,
    ledger: Ledger,
    tags: TagTable,
    richtext: RichText,
    profiles: HashMap<Pk, Profile>,
    /// Pre-built user records, in pk order.
    users: Vec<(String, Record)>,
    /// `(meeting, user)` pairs already reported as outside their meeting.
    reported_outsiders: HashSet<(Pk, Pk)>,
}

impl<'a> Exporter<'a> {
    fn new(config: &'a ExportConfig) -> Result<Self> {
        Ok(Self {
            config,
            registry: Registry::new(),
            stream: RecordStream::new(config.validate_records),
            ledger: Ledger::new(config.dedup_mode(), config.die_on_critical),
            tags: TagTable::new(),
            richtext: RichText::new().context("Failed to compile rich-text patterns")?,
            profiles: HashMap::new(),
            users: Vec::new(),
            reported_outsiders: HashSet::new(),
        })
    }

    fn run(&mut self, tree: &SourceTree) -> Result<(), Halt> {
        info!(title = %tree.organisation.title, "exporting organisation");
        self.organisation(&tree.organisation)?;
        self.users(&tree.users)?;

        info!(meetings = tree.meetings.len(), "exporting meetings");
        for source in &tree.meetings {
            if !self.config.includes_meeting(&source.name) {
                info!(meeting = %source.name, "skipping meeting");
                continue;
            }
            meeting::export_meeting(self, source)?;
        }
        Ok(())
    }

    fn finish(self, halted: Option<Halt>) -> ExportOutcome {
        let mut records = Vec::with_capacity(self.users.len() + self.stream.len());
        let mut skipped_users = Vec::new();
        for (userid, record) in self.users {
            if self.registry.is_needed(EntityKind::User, &userid) {
                records.push(record);
            } else {
                skipped_users.push(userid);
            }
        }
        if !skipped_users.is_empty() {
            info!(skipped = skipped_users.len(), "users not referenced by any exported meeting");
        }
        records.extend(self.stream.into_records());
        info!(records = records.len(), diagnostics = self.ledger.total(), "export finished");

        ExportOutcome {
            records,
            ledger: self.ledger,
            truncated_tags: self
                .tags
                .entries()
                .map(|(long, short)| (long.to_string(), short.to_string()))
                .collect(),
            skipped_users,
            halted,
        }
    }

    fn organisation(&mut self, organisation: &Organisation) -> Result<(), Halt> {
        let body = match organisation.description.as_deref() {
            Some(description) if !description.is_empty() => {
                format!("{description}<br/><br/>{}", organisation.body)
            }
            _ => organisation.body.clone(),
        };
        let fields = OrganisationFields {
            created: organisation.created,
            modified: organisation.modified,
            title: organisation.title.clone(),
            body,
        };
        self.emit("/", EntityKind::Organisation, &fields)?;
        Ok(())
    }

    /// Assign every user a pk and build its record. Records are held back
    /// until the end of the run, when it is known which users are needed.
    fn users(&mut self, users: &[User]) -> Result<(), Halt> {
        info!(users = users.len(), "assigning user pks");
        let mut emails: HashMap<String, String> = HashMap::new();
        for user in users {
            let path = format!("/users/{}", user.userid);
            if self.registry.peek(EntityKind::User, &user.userid).is_some() {
                self.ledger.report(
                    &path,
                    Diagnostic::new(
                        ErrorCode::SecurityEntry,
                        format!(
                            "Userid {} differs from another user only by case, skipped",
                            user.userid
                        ),
                    ),
                )?;
                continue;
            }
            let pk = self.registry.assign_or_get(EntityKind::User, &user.userid);
            self.profiles.insert(
                pk,
                Profile {
                    name: user.display_name(),
                    created: user.created,
                    modified: user.modified,
                },
            );

            let email = match self.config.email_overrides.get(&user.userid) {
                Some(forced) => {
                    debug!(userid = %user.userid, "using configured email override");
                    forced.clone()
                }
                None => user.email.as_deref().unwrap_or_default().to_lowercase(),
            };
            if !email.is_empty() {
                if let Some(other) = emails.insert(email.clone(), user.userid.clone()) {
                    if self.config.report_duplicate_email {
                        self.ledger.report(
                            &path,
                            Diagnostic::new(
                                ErrorCode::DuplicateEmail,
                                format!("Duplicate email: {email} also used by userid {other}"),
                            ),
                        )?;
                    }
                }
            }

            let fields = UserFields {
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                date_joined: user.created,
                last_login: user.modified,
                email,
                organisation: 1,
                userid: user.userid.clone(),
                username: uuid::Uuid::new_v4().to_string(),
            };
            match self.stream.build(EntityKind::User, pk, &fields) {
                Ok(record) => self.users.push((user.userid.clone(), record)),
                Err(err) => self.ledger.record(&path, err)?,
            }
        }
        Ok(())
    }

    /// Emit a record, routing a build failure into the ledger.
    fn emit<F: Serialize>(
        &mut self,
        path: &str,
        kind: EntityKind,
        fields: &F,
    ) -> Result<Option<Pk>, Halt> {
        let emitted = self.stream.emit(&mut self.registry, kind, fields);
        self.settle(path, emitted)
    }

    /// Unwrap a step result, recording the failure under `path`.
    fn settle<T>(&mut self, path: &str, result: Result<T, ExportError>) -> Result<Option<T>, Halt> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                debug!(path, "step failed: {err}");
                self.ledger.record(path, err)?;
                Ok(None)
            }
        }
    }

    /// Resolve a userid, marking the user as needed. A missing user is
    /// critical: something in the tree points at a deleted account.
    fn user(
        &mut self,
        path: &str,
        userid: &str,
        context: Option<&str>,
    ) -> Result<Option<Pk>, Halt> {
        self.registry.mark_needed(EntityKind::User, userid);
        match self.registry.resolve(EntityKind::User, userid) {
            Ok(pk) => Ok(Some(pk)),
            Err(_) => {
                let message = match context {
                    Some(context) => format!("Missing user '{userid}' {context}"),
                    None => format!("Missing user '{userid}'"),
                };
                self.ledger
                    .critical(path, Diagnostic::new(ErrorCode::MissingUser, message))?;
                Ok(None)
            }
        }
    }

    /// Like [`user`](Self::user), and also check the user holds a role in
    /// the meeting. Outsiders are reported once per meeting and still
    /// resolve.
    fn member(
        &mut self,
        scope: &MeetingScope,
        path: &str,
        userid: &str,
        context: Option<&str>,
    ) -> Result<Option<Pk>, Halt> {
        let Some(pk) = self.user(path, userid, context)? else {
            return Ok(None);
        };
        if !scope.members.contains(&pk) && self.reported_outsiders.insert((scope.pk, pk)) {
            self.ledger.report(
                path,
                Diagnostic::new(
                    ErrorCode::UserOutsideMeeting,
                    format!(
                        "Membership check failed for meeting {}, userid {userid} not part of meeting",
                        scope.name
                    ),
                ),
            )?;
        }
        Ok(Some(pk))
    }

    fn profile(&self, pk: Pk) -> Option<&Profile> {
        self.profiles.get(&pk)
    }

    /// Mentions and hashtags to rich-text spans. Mentioned users count as
    /// needed.
    fn convert_body(&mut self, text: &str) -> String {
        let registry = &mut self.registry;
        let profiles = &self.profiles;
        self.richtext.convert_body(text, |userid| {
            let pk = registry.resolve(EntityKind::User, userid).ok()?;
            let name = profiles
                .get(&pk)
                .map_or_else(|| userid.to_string(), |profile| profile.name.clone());
            Some((pk, name))
        })
    }
}

/// First `max` characters of `text`.
fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
