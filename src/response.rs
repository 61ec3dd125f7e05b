//! Error extraction for non-2xx responses
//!
//! The record store answers errors either with a single message
//! (`{"detail": ...}`, `{"error": ...}`) or with a per-field map of messages;
//! the asset server uses `{"success": false, "error": ...}`. Both are folded
//! into one `Error` here so every client call reports failures the same way.

use crate::{error::FieldErrors, Error};
use reqwest::{Response, StatusCode};
use serde_json::Value;

const MESSAGE_KEYS: &[&str] = &["detail", "error", "message"];

/// Read the body of a failed response and normalize it.
pub async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    match response.text().await {
        Ok(body) => normalize_error(status, &body),
        Err(e) => Error::Request {
            status: Some(status.as_u16()),
            message: format!("Failed to read error body: {}", e),
        },
    }
}

pub fn normalize_error(status: StatusCode, body: &str) -> Error {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(single_message);

    if status == StatusCode::NOT_FOUND {
        return Error::NotFound(message.unwrap_or_else(|| fallback_message(status, body)));
    }

    if let Some(map) = parsed.as_ref().and_then(Value::as_object) {
        if status.is_client_error() {
            if let Some(message) = message {
                let mut errors = FieldErrors::new();
                errors.insert("detail".to_string(), vec![message]);
                return Error::Validation(errors);
            }
            let errors = field_errors(map);
            if !errors.is_empty() {
                return Error::Validation(errors);
            }
        } else if let Some(message) = message {
            return Error::Request {
                status: Some(status.as_u16()),
                message,
            };
        }
    }

    Error::Request {
        status: Some(status.as_u16()),
        message: fallback_message(status, body),
    }
}

fn single_message(value: &Value) -> Option<String> {
    MESSAGE_KEYS
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn field_errors(map: &serde_json::Map<String, Value>) -> FieldErrors {
    map.iter()
        .filter(|(field, _)| field.as_str() != "success")
        .filter_map(|(field, value)| {
            let messages: Vec<String> = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
                Value::Null => Vec::new(),
                other => vec![other.to_string()],
            };
            (!messages.is_empty()).then(|| (field.clone(), messages))
        })
        .collect()
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        body.to_string()
    }
}
