//! Speaker list history.
//!
//! Only one speaker list system per meeting can be represented. Lists are
//! exported closed, with one speaker record per recorded speaking turn.

use serde_json::{Map, Value};
use tracing::debug;

use super::meeting::MeetingScope;
use super::{Exporter, clip};
use crate::error::{Diagnostic, ErrorCode, Halt};
use crate::model::fields::{SpeakerFields, SpeakerListFields, SpeakerListSystemFields};
use crate::model::EntityKind;
use crate::source::{Meeting, SpeakerSettings};

const MAX_LIST_TITLE_LEN: usize = 200;
/// Speaking time is stored as a small int.
const MAX_SECONDS: u32 = 30_000;

/// Target speaker system for the legacy settings.
#[derive(Debug)]
struct SpeakerMethod {
    name: &'static str,
    settings: Map<String, Value>,
    /// Set when the mapping loses behavior.
    note: Option<&'static str>,
}

impl SpeakerMethod {
    fn simple(note: Option<&'static str>) -> Self {
        Self {
            name: "simple",
            settings: Map::new(),
            note,
        }
    }

    fn priority(max_times: u32, note: Option<&'static str>) -> Self {
        let mut settings = Map::new();
        settings.insert("max_times".into(), Value::from(max_times));
        Self {
            name: "priority",
            settings,
            note,
        }
    }
}

/// `None` when the plugin has no target counterpart.
fn speaker_method(settings: &SpeakerSettings) -> Option<SpeakerMethod> {
    if settings.speaker_list_count == 1 {
        return Some(SpeakerMethod::simple(None));
    }
    match settings.speaker_list_plugin.as_deref() {
        None | Some("") => Some(SpeakerMethod::priority(settings.speaker_list_count, None)),
        Some("female_priority") => Some(SpeakerMethod::priority(
            settings.speaker_list_count,
            Some("'female_priority' speaker lists exported as priority."),
        )),
        Some("global_lists") => Some(SpeakerMethod::simple(Some(
            "'global_lists' speaker lists aren't handled, exported as 'simple'.",
        ))),
        Some(_) => None,
    }
}

pub(super) fn export_speaker_lists(
    ex: &mut Exporter<'_>,
    scope: &MeetingScope,
    meeting: &Meeting,
) -> Result<(), Halt> {
    if meeting.speaker_lists.is_empty() {
        return Ok(());
    }
    let path = scope.path.as_str();
    let settings = meeting.speaker_settings.clone().unwrap_or_default();
    let Some(method) = speaker_method(&settings) else {
        ex.ledger.report(
            path,
            Diagnostic::new(
                ErrorCode::SpeakerListVariant,
                format!(
                    "Unknown speaker list plugin {}, speaker lists not exported",
                    settings.speaker_list_plugin.as_deref().unwrap_or_default()
                ),
            ),
        )?;
        return Ok(());
    };
    if let Some(note) = method.note {
        ex.ledger
            .report(path, Diagnostic::new(ErrorCode::SpeakerListVariant, note))?;
    }

    let system = SpeakerListSystemFields {
        state: "archived",
        meeting: scope.pk,
        method_name: method.name,
        settings_data: method.settings,
        safe_positions: settings.safe_positions,
    };
    let Some(system_pk) = ex.emit(path, EntityKind::SpeakerListSystem, &system)? else {
        return Ok(());
    };

    for list in &meeting.speaker_lists {
        let Some(&(ai_pk, ai_created)) = scope.agenda_items.get(list.agenda_item_uid()) else {
            debug!(key = %list.key, "speaker list of a deleted agenda item");
            continue;
        };
        let list_path = format!("{path}/speakers/{}", list.key);
        // Speakers point at the list, which is appended after them.
        let list_pk = ex.registry.next_pk(EntityKind::SpeakerList);
        let created = list.modified.unwrap_or(ai_created);

        for (number, turns) in &list.speaker_log {
            if turns.is_empty() {
                continue;
            }
            // Anonymous speakers have no participant number holder.
            let Some(userid) = scope.participant_numbers.get(&i64::from(*number)) else {
                continue;
            };
            let Some(user) = ex.member(scope, &list_path, userid, None)? else {
                continue;
            };
            for &seconds in turns {
                if seconds > MAX_SECONDS {
                    debug!(key = %list.key, seconds, "clamping speaker time");
                }
                let speaker = SpeakerFields {
                    user,
                    speaker_list: list_pk,
                    created,
                    started: created,
                    seconds: seconds.min(MAX_SECONDS),
                };
                ex.emit(&list_path, EntityKind::Speaker, &speaker)?;
            }
        }

        let fields = SpeakerListFields {
            title: clip(&list.title, MAX_LIST_TITLE_LEN),
            state: "closed",
            speaker_system: system_pk,
            agenda_item: ai_pk,
        };
        ex.emit(&list_path, EntityKind::SpeakerList, &fields)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(count: u32, plugin: Option<&str>) -> SpeakerSettings {
        SpeakerSettings {
            safe_positions: 1,
            speaker_list_count: count,
            speaker_list_plugin: plugin.map(str::to_string),
        }
    }

    #[test]
    fn single_list_is_simple() {
        let method = speaker_method(&settings(1, Some("female_priority"))).expect("mapped");
        assert_eq!(method.name, "simple");
        assert!(method.settings.is_empty());
        assert!(method.note.is_none());
    }

    #[test]
    fn default_plugin_is_priority() {
        let method = speaker_method(&settings(3, None)).expect("mapped");
        assert_eq!(method.name, "priority");
        assert_eq!(method.settings["max_times"], 3);
        assert!(method.note.is_none());
    }

    #[test]
    fn lossy_plugins_carry_a_note() {
        let method = speaker_method(&settings(2, Some("female_priority"))).expect("mapped");
        assert_eq!(method.name, "priority");
        assert!(method.note.is_some());
        let method = speaker_method(&settings(2, Some("global_lists"))).expect("mapped");
        assert_eq!(method.name, "simple");
        assert!(method.note.is_some());
    }

    #[test]
    fn unknown_plugin_has_no_method() {
        assert!(speaker_method(&settings(2, Some("lottery"))).is_none());
    }
}
