//! Per-method settings normalization.
//!
//! Runs before result transcoding because a setting can change the method
//! itself: a one-seat repeated poll is exported as its single-seat sibling.

use serde_json::{Map, Value};

use super::{PollInput, VotingMethod};
use crate::error::{Diagnostic, ErrorCode, ExportError};

/// Settings after normalization, with the possibly re-tagged method and the
/// result payload it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsOutcome {
    pub method: VotingMethod,
    pub settings: Map<String, Value>,
    pub result: Option<Value>,
    pub notes: Vec<Diagnostic>,
}

/// # Errors
///
/// Abort for a zero-seat STV poll or a non-integer `winners` setting; skip
/// when a re-tag needs result data that is not there.
pub fn adjust(legacy: VotingMethod, input: &PollInput<'_>) -> Result<SettingsOutcome, ExportError> {
    let mut settings = input.settings.clone();
    let mut result = if input.closed {
        input.result.cloned()
    } else {
        None
    };
    let mut method = legacy;
    let mut notes = Vec::new();

    match legacy {
        VotingMethod::SortedSchulze => match winners(&settings)? {
            Some(0) => {
                settings.insert("winners".into(), Value::Null);
            }
            Some(1) => {
                method = VotingMethod::Schulze;
                if let Some(raw) = result.take() {
                    result = Some(first_round(raw)?);
                }
            }
            _ => {}
        },
        VotingMethod::RepeatedIrv => {
            let seats = match winners(&settings)? {
                Some(seats) => seats,
                None => {
                    let seats = match &result {
                        Some(raw) => result_winner_count(raw)?,
                        None => 1,
                    };
                    settings.insert("winners".into(), Value::from(seats));
                    seats
                }
            };
            if seats < 1 {
                return Err(zero_seats());
            }
            if seats == 1 {
                method = VotingMethod::Irv;
            }
        }
        VotingMethod::ScottishStv | VotingMethod::Irv => match winners(&settings)? {
            None => {
                notes.push(Diagnostic::new(
                    ErrorCode::SettingsCorrected,
                    format!("Missing settings for {legacy}, setting winners to 1. Will export"),
                ));
                settings.insert("winners".into(), Value::from(1));
            }
            Some(seats) if seats < 1 => return Err(zero_seats()),
            Some(_) => {}
        },
        VotingMethod::Dutt => {
            let max = int_setting(&settings, "max").unwrap_or(0);
            let min = int_setting(&settings, "min").unwrap_or(0);
            if max < min {
                notes.push(Diagnostic::new(
                    ErrorCode::SettingsCorrected,
                    format!("Dutt poll with lower max than min. Raised max to {min}"),
                ));
                settings.insert("max".into(), Value::from(min));
            }
        }
        VotingMethod::Schulze
        | VotingMethod::SchulzePr
        | VotingMethod::SchulzeStv
        | VotingMethod::CombinedSimple
        | VotingMethod::Majority => {}
    }

    Ok(SettingsOutcome {
        method,
        settings,
        result,
        notes,
    })
}

/// `max_stars` from legacy settings, default 5.
#[must_use]
pub fn max_stars(settings: &Map<String, Value>) -> i64 {
    int_setting(settings, "max_stars").unwrap_or(5)
}

fn int_setting(settings: &Map<String, Value>, key: &str) -> Option<i64> {
    settings.get(key).and_then(Value::as_i64)
}

/// `winners`, where absent and `null` both mean "not set".
fn winners(settings: &Map<String, Value>) -> Result<Option<i64>, ExportError> {
    match settings.get("winners") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            ExportError::abort(
                ErrorCode::InvalidSettings,
                format!("winners setting is not an integer: {value}"),
            )
        }),
    }
}

fn zero_seats() -> ExportError {
    ExportError::abort(ErrorCode::InvalidSettings, "Zero winner STV poll, can't export")
}

fn first_round(raw: Value) -> Result<Value, ExportError> {
    match raw {
        Value::Object(mut map) => match map.remove("rounds") {
            Some(Value::Array(rounds)) if !rounds.is_empty() => {
                Ok(rounds.into_iter().next().unwrap_or(Value::Null))
            }
            _ => Err(ExportError::skip(
                ErrorCode::MalformedResult,
                "Single winner sorted_schulze result without rounds, skipping",
            )),
        },
        _ => Err(ExportError::skip(
            ErrorCode::MalformedResult,
            "Result data isn't a dict, skipping",
        )),
    }
}

fn result_winner_count(raw: &Value) -> Result<i64, ExportError> {
    raw.get("winners")
        .and_then(Value::as_array)
        .and_then(|winners| i64::try_from(winners.len()).ok())
        .ok_or_else(|| {
            ExportError::skip(
                ErrorCode::MissingWinner,
                "No winners in result data, skipping",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adjust_with(
        plugin: &str,
        settings: Value,
        result: Option<Value>,
        closed: bool,
    ) -> Result<SettingsOutcome, ExportError> {
        let settings = settings.as_object().cloned().unwrap_or_default();
        let input = PollInput {
            plugin,
            settings: &settings,
            result: result.as_ref(),
            closed,
            vote_count: 0,
        };
        adjust(VotingMethod::from_plugin(plugin)?, &input)
    }

    #[test]
    fn sorted_schulze_zero_winners_means_unbounded() {
        let out =
            adjust_with("sorted_schulze", json!({"winners": 0}), None, false).expect("adjust");
        assert_eq!(out.settings["winners"], Value::Null);
        assert_eq!(out.method, VotingMethod::SortedSchulze);
    }

    #[test]
    fn sorted_schulze_single_winner_becomes_schulze_first_round() {
        let result = json!({"winners": ["a"], "rounds": [{"winner": "a"}, {"winner": "b"}]});
        let out = adjust_with("sorted_schulze", json!({"winners": 1}), Some(result), true)
            .expect("adjust");
        assert_eq!(out.method, VotingMethod::Schulze);
        assert_eq!(out.result, Some(json!({"winner": "a"})));
    }

    #[test]
    fn scottish_stv_missing_winners_defaults_to_one() {
        let out = adjust_with("scottish_stv", json!({}), None, false).expect("adjust");
        assert_eq!(out.settings["winners"], json!(1));
        assert_eq!(out.notes.len(), 1);
        assert_eq!(out.notes[0].code, ErrorCode::SettingsCorrected);
    }

    #[test]
    fn zero_seat_stv_is_critical() {
        let err =
            adjust_with("scottish_stv", json!({"winners": 0}), None, false).expect_err("zero");
        assert!(err.is_critical());
        assert_eq!(err.diagnostic().code, ErrorCode::InvalidSettings);
    }

    #[test]
    fn repeated_irv_derives_winners_from_result() {
        let result = json!({"winners": ["a", "b"]});
        let out = adjust_with("repeated_irv", json!({}), Some(result), true).expect("adjust");
        assert_eq!(out.settings["winners"], json!(2));
        assert_eq!(out.method, VotingMethod::RepeatedIrv);
        assert!(out.notes.is_empty());
    }

    #[test]
    fn repeated_irv_single_seat_becomes_irv() {
        let out = adjust_with("repeated_irv", json!({}), None, false).expect("adjust");
        assert_eq!(out.settings["winners"], json!(1));
        assert_eq!(out.method, VotingMethod::Irv);
    }

    #[test]
    fn dutt_max_below_min_is_raised() {
        let out =
            adjust_with("dutt_poll", json!({"min": 3, "max": 1}), None, false).expect("adjust");
        assert_eq!(out.settings["max"], json!(3));
        assert_eq!(out.notes.len(), 1);
    }

    #[test]
    fn max_stars_defaults_to_five() {
        assert_eq!(max_stars(&Map::new()), 5);
        let settings = json!({"max_stars": 3}).as_object().cloned().unwrap_or_default();
        assert_eq!(max_stars(&settings), 3);
    }
}
