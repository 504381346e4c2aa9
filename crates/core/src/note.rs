//! Renders the lead note attached after every reconciled call.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::domain::call::{NormalizedCallRecord, TurnRole};

const PLACEHOLDER: &str = "—";
const MOSCOW_OFFSET_SECS: i32 = 3 * 3600;

pub fn format_note(record: &NormalizedCallRecord) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(company) = record.company.as_deref() {
        lines.push(format!("<b>Компания: {company}</b>"));
        lines.push(String::new());
    }

    let digits = record.phone_digits();
    lines.push(format!("Имя: {}", or_placeholder(record.name.as_deref())));
    lines.push(format!(
        "Телефон: {}",
        if digits.is_empty() { PLACEHOLDER.to_owned() } else { format!("+{digits}") }
    ));
    lines.push(format!("Длительность звонка: {}", format_duration(record.call_duration_ms)));
    lines.push(format!(
        "Время начала звонка: {}",
        format_optional_time(record.call_started_at.as_deref())
    ));
    lines.push(format!(
        "Заинтересованность: {}",
        record.interest().map(|rate| format!("{rate}%")).unwrap_or_else(|| PLACEHOLDER.to_owned())
    ));
    lines.push(format!("Запись звонка: {}", or_placeholder(record.record_url.as_deref())));

    lines.push(String::new());
    lines.push(format!("Договоренности: {}", or_placeholder(record.agreements.as_deref())));
    lines.push(format!(
        "Время договоренности: {}",
        format_optional_time(record.agreements_time.as_deref())
    ));

    if let Some(region) = record.region.as_deref() {
        lines.push(format!("Возможный регион: {region}"));
    }

    let tags = if record.tags.is_empty() { PLACEHOLDER.to_owned() } else { record.tags.join(", ") };
    lines.push(format!("Теги: {tags}"));

    if let Some(facts) = record.client_facts.as_deref() {
        lines.push(String::new());
        lines.push("О клиенте:".to_owned());
        lines.push(facts.to_owned());
    }

    if !record.transcript.is_empty() {
        lines.push(String::new());
        lines.push("Диалог:".to_owned());
        for turn in &record.transcript {
            let label = match turn.role {
                TurnRole::Client => "Клиент",
                TurnRole::Assistant => "Ассистент",
            };
            lines.push(format!("{label}: {}", turn.content));
        }
    }

    lines.join("\n")
}

/// `MM:SS` from milliseconds, floored to whole seconds. Absent or zero renders the placeholder.
pub fn format_duration(millis: Option<u64>) -> String {
    match millis {
        Some(millis) if millis > 0 => {
            let total_seconds = millis / 1000;
            format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
        }
        _ => PLACEHOLDER.to_owned(),
    }
}

/// `DD.MM.YYYY HH:MM по МСК`.
///
/// `YYYY-MM-DD HH:MM:SS` is already Moscow wall-clock time. RFC 3339 input is shifted into
/// UTC+03:00 and naive ISO input is read as Moscow time. Anything else is echoed unchanged.
pub fn format_moscow_time(raw: &str) -> String {
    let Some(moscow) = FixedOffset::east_opt(MOSCOW_OFFSET_SECS) else {
        return raw.to_owned();
    };

    let parsed = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw).ok().map(|at| at.with_timezone(&moscow).naive_local())
        })
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M").ok());

    match parsed.and_then(|local| moscow.from_local_datetime(&local).single()) {
        Some(at) => at.format("%d.%m.%Y %H:%M по МСК").to_string(),
        None => raw.to_owned(),
    }
}

fn format_optional_time(raw: Option<&str>) -> String {
    raw.map(format_moscow_time).unwrap_or_else(|| PLACEHOLDER.to_owned())
}

fn or_placeholder(value: Option<&str>) -> &str {
    value.unwrap_or(PLACEHOLDER)
}
