//! Pulls structured records out of model responses.
//!
//! Models are asked for bare JSON but often wrap it in prose or a markdown
//! fence. The lookup order is: fenced block, then the first brace-balanced
//! object, then failure. A candidate that does not parse is a hard failure.

use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{
    error::LaasError,
    models::{LandingContent, LandingCopy},
};

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced-json regex"));

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    content: Vec<Value>,
}

/// Text of the first content block of a Messages API response.
pub fn completion_text(raw: &[u8]) -> Result<String, LaasError> {
    let envelope: MessagesEnvelope = serde_json::from_slice(raw)
        .map_err(|e| LaasError::Validation(format!("model response is not valid JSON: {e}")))?;
    let text = envelope
        .content
        .first()
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(text.to_string())
}

pub fn find_json_object(text: &str) -> Option<&str> {
    if let Some(captures) = FENCED_JSON.captures(text) {
        return captures.get(1).map(|m| m.as_str());
    }
    balanced_object(text)
}

/// First `{ ... }` span whose braces balance, ignoring braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_embedded<T: DeserializeOwned>(text: &str) -> Result<T, LaasError> {
    let json = find_json_object(text)
        .ok_or_else(|| LaasError::Validation("No valid JSON found in model response".into()))?;
    serde_json::from_str(json).map_err(|e| LaasError::Validation(format!("Invalid landing content structure: {e}")))
}

pub fn extract_landing_content(raw: &[u8]) -> Result<LandingContent, LaasError> {
    parse_embedded(&completion_text(raw)?)
}

pub fn extract_copy(raw: &[u8]) -> Result<LandingCopy, LaasError> {
    parse_embedded(&completion_text(raw)?)
}

#[derive(Debug, Deserialize)]
struct ImageEnvelope {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Decoded bytes of the first image of an image-generation response.
pub fn extract_image(raw: &[u8]) -> Result<Vec<u8>, LaasError> {
    let envelope: ImageEnvelope = serde_json::from_slice(raw)
        .map_err(|e| LaasError::Validation(format!("image response is not valid JSON: {e}")))?;
    if let Some(error) = envelope.error.filter(|e| !e.is_empty()) {
        return Err(LaasError::Generation(format!("image model reported an error: {error}")));
    }
    let encoded = envelope
        .images
        .first()
        .ok_or_else(|| LaasError::Validation("no image data in response".into()))?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| LaasError::Validation(format!("image data is not valid base64: {e}")))
}

#[derive(Debug, Deserialize)]
struct TextResults {
    #[serde(default)]
    results: Vec<TextResult>,
}

#[derive(Debug, Deserialize)]
struct TextResult {
    #[serde(default, rename = "outputText")]
    output_text: String,
}

/// `results[0].outputText` of a text-completion response.
pub fn extract_output_text(raw: &[u8]) -> Result<String, LaasError> {
    let parsed: TextResults = serde_json::from_slice(raw)
        .map_err(|e| LaasError::Validation(format!("model response is not valid JSON: {e}")))?;
    let text = parsed.results.into_iter().next().map(|r| r.output_text).unwrap_or_default();
    if text.trim().is_empty() {
        return Err(LaasError::Validation("model returned no output text".into()));
    }
    Ok(text)
}
