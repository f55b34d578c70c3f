//! Trigger payload decoding and the proxy-style response envelope.
//!
//! A function can be triggered by an API Gateway proxy event (`body`, optionally
//! base64 encoded), by a workflow engine that nests the JSON under
//! `node.inputs[0].value`, or directly with the request object.

use std::collections::BTreeMap;

use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use crate::{error::LaasError, models::GenerationRequest};

pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "Content-Type,Authorization"),
    ("Access-Control-Allow-Methods", "OPTIONS,POST"),
];

pub fn decode_payload(event: &Value) -> Result<Value, LaasError> {
    if let Some(node) = event.get("node") {
        let value = node
            .pointer("/inputs/0/value")
            .ok_or_else(|| LaasError::Validation("missing field 'node.inputs[0].value'".into()))?;
        return match value {
            Value::String(raw) => parse_json_text(raw),
            other => Ok(other.clone()),
        };
    }

    if let Some(body) = event.get("body") {
        return match body {
            Value::Null => Ok(Value::Object(Default::default())),
            Value::String(raw) => {
                let encoded = event.get("isBase64Encoded").and_then(Value::as_bool).unwrap_or(false);
                if encoded {
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(raw.trim())
                        .map_err(|e| LaasError::Validation(format!("body is not valid base64: {e}")))?;
                    let text = String::from_utf8(bytes)
                        .map_err(|e| LaasError::Validation(format!("body is not valid UTF-8: {e}")))?;
                    parse_json_text(&text)
                } else {
                    parse_json_text(raw)
                }
            }
            other => Ok(other.clone()),
        };
    }

    Ok(event.clone())
}

pub fn parse_request(event: &Value) -> Result<GenerationRequest, LaasError> {
    let payload = decode_payload(event)?;
    serde_json::from_value(payload).map_err(|e| LaasError::Validation(format!("Invalid request format: {e}")))
}

/// Parses a raw HTTP body; an empty body is an empty request object.
pub fn parse_body(body: &[u8]) -> Result<GenerationRequest, LaasError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| LaasError::Validation(format!("body is not valid UTF-8: {e}")))?;
    let payload = parse_json_text(text)?;
    serde_json::from_value(payload).map_err(|e| LaasError::Validation(format!("Invalid request format: {e}")))
}

fn parse_json_text(raw: &str) -> Result<Value, LaasError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| LaasError::Validation(format!("Invalid request format: {e}")))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ProxyResponse {
    pub fn ok<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self::new(200, body),
            Err(e) => Self::from_error(&LaasError::Unexpected(format!("failed to encode response: {e}"))),
        }
    }

    pub fn from_error(err: &LaasError) -> Self {
        Self::new(err.status_code().as_u16(), err.body().to_string())
    }

    fn new(status_code: u16, body: String) -> Self {
        let headers = CORS_HEADERS.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Self { status_code, headers, body }
    }
}
