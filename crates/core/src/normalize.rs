//! Webhook body → [`NormalizedCallRecord`].

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::call::{digits_only, NormalizedCallRecord, TranscriptTurn, TurnRole};
use crate::errors::ValidationError;

pub fn normalize(raw: &Value) -> Result<NormalizedCallRecord, ValidationError> {
    let phone = lookup(raw, &["contact", "phone"])
        .and_then(string_field)
        .filter(|phone| !digits_only(phone).is_empty())
        .ok_or(ValidationError::MissingPhone)?;

    let agreements = lookup(raw, &["call", "agreements"]);
    let agreement = |key: &str| agreements.and_then(|value| value.get(key)).and_then(string_field);
    let transfer = agreements.and_then(|value| value.get("leadTransfer"));
    let transfer_field =
        |key: &str| transfer.and_then(|value| value.get(key)).and_then(string_field);
    let call_field = |key: &str| lookup(raw, &["call", key]).and_then(string_field);

    let name = lookup(raw, &["contact", "additionalFields", "name"])
        .and_then(string_field)
        .or_else(|| agreement("client_name"));

    Ok(NormalizedCallRecord {
        phone,
        name,
        email: transfer_field("email"),
        company: transfer_field("company"),
        position: transfer_field("position"),
        budget: transfer.and_then(|value| value.get("budget")).and_then(parse_budget),
        source: transfer_field("source"),
        priority: transfer_field("priority"),
        region: transfer_field("region"),
        tags: lookup(raw, &["contact", "tags"]).map(parse_tags).unwrap_or_default(),
        record_url: call_field("recordUrl"),
        agreements: agreement("agreements"),
        agreements_time: agreement("agreements_time_local"),
        call_duration_ms: lookup(raw, &["call", "duration"]).and_then(parse_duration_ms),
        call_started_at: call_field("startedAt"),
        contact_rate: agreement("contact_rate"),
        cval_rate: agreement("cval_rate"),
        client_facts: agreement("client_facts"),
        transcript: lookup(raw, &["call", "callDetails", "chatHistory"])
            .map(parse_transcript)
            .unwrap_or_default(),
    })
}

fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(raw, |value, key| value.get(*key))
}

/// Trimmed, non-empty text. Numbers and booleans are stringified.
fn string_field(value: &Value) -> Option<String> {
    match value {
        Value::String(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Bool(value) => Some(value.to_string()),
        Value::Number(value) => Some(value.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_budget(value: &Value) -> Option<Decimal> {
    let parsed = match value {
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Some(Decimal::from(integer)),
            None => number.as_f64().filter(|float| float.is_finite()).and_then(Decimal::from_f64),
        },
        Value::String(text) => {
            let text = text.trim();
            Decimal::from_str(text).ok().or_else(|| Decimal::from_scientific(text).ok())
        }
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    };
    parsed.filter(|budget| !budget.is_sign_negative() || budget.is_zero())
}

fn parse_tags(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(string_field).collect())
        .unwrap_or_default()
}

fn parse_duration_ms(value: &Value) -> Option<u64> {
    let millis = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }?;
    if millis.is_finite() && millis >= 0.0 {
        Some(millis.floor() as u64)
    } else {
        None
    }
}

fn parse_transcript(value: &Value) -> Vec<TranscriptTurn> {
    let Some(turns) = value.as_array() else {
        return Vec::new();
    };
    turns
        .iter()
        .filter(|turn| turn.is_object())
        .map(|turn| TranscriptTurn {
            role: TurnRole::from_wire(turn.get("role").and_then(Value::as_str).unwrap_or_default()),
            content: turn.get("content").and_then(Value::as_str).unwrap_or_default().to_owned(),
        })
        .collect()
}
