//! Canonical `YYYY-MM-DD` dates for the record store.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

const CANONICAL: &str = "%Y-%m-%d";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

// Day-first before month-first: the dashboard is used with a Spanish locale.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Normalize `input` to `YYYY-MM-DD`, falling back to today's local date when
/// it cannot be parsed.
pub fn normalize_date(input: &str) -> String {
    normalize_date_or(input, Local::now().date_naive())
}

pub fn normalize_date_or(input: &str, fallback: NaiveDate) -> String {
    match parse_date(input) {
        Some(date) => date.format(CANONICAL).to_string(),
        None => {
            tracing::warn!(
                "Unparseable date '{}', falling back to {}",
                input,
                fallback.format(CANONICAL)
            );
            fallback.format(CANONICAL).to_string()
        }
    }
}

pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, CANONICAL) {
        return Some(date);
    }

    // Offsets are honored as written: the calendar date the user typed wins
    // over its UTC equivalent.
    if let Ok(datetime) = DateTime::parse_from_rfc3339(input) {
        return Some(datetime.date_naive());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc2822(input) {
        return Some(datetime.date_naive());
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(input, format) {
            return Some(datetime.date());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return Some(date);
        }
    }

    parse_js_date_string(input)
}

/// `Fri Mar 01 2024 10:00:00 GMT+0100 (hora estándar de Europa central)`
fn parse_js_date_string(input: &str) -> Option<NaiveDate> {
    let prefix: Vec<&str> = input.split_whitespace().take(4).collect();
    if prefix.len() < 4 {
        return None;
    }
    NaiveDate::parse_from_str(&prefix[1..].join(" "), "%b %d %Y").ok()
}

/// Normalize the named date fields of a JSON body in place.
///
/// Absent or null fields are left alone and blank strings become null, so an
/// optional end date is never silently set to today.
pub fn normalize_date_fields(body: &mut Map<String, Value>, fields: &[&str]) {
    for field in fields {
        let Some(value) = body.get_mut(*field) else {
            continue;
        };
        match value {
            Value::String(raw) if raw.trim().is_empty() => *value = Value::Null,
            Value::String(raw) => *raw = normalize_date(raw),
            _ => {}
        }
    }
}
