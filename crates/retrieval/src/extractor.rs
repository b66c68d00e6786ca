//! Triple extraction from chunk text via a completion model.
//!
//! The model is asked for a bare JSON array of `{subject, relation, object}`
//! objects. Models often wrap the array in prose or code fences anyway, so
//! the response is scanned for the first balanced `[...]` before parsing.

use crate::intelligence::{ChatMessage, Completer, IntelligenceError};
use graphloom::RelationType;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// A `(subject, relation, object)` fact extracted from one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triple {
    pub subject: String,
    pub relation: RelationType,
    pub object: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("completion failed: {0}")]
    Completion(#[from] IntelligenceError),
    #[error("no JSON array in model response")]
    NoJsonArray,
    #[error("malformed JSON in model response: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

fn extraction_prompt(text: &str) -> String {
    format!(
        r#"You are an information extraction assistant.
Extract factual relationships from the text below **only** in JSON format.
Each triple should have 'subject', 'relation', and 'object'.
Do NOT include explanations, commentary, or markdown formatting.

Example output:
[
  {{"subject": "Barack Obama", "relation": "born in", "object": "Honolulu"}},
  {{"subject": "Honolulu", "relation": "located in", "object": "United States"}}
]

Text:
"""{text}""""#
    )
}

/// Sends chunk text to a [`Completer`] and parses the triples it returns.
#[derive(Clone)]
pub struct TripleExtractor {
    completer: Arc<dyn Completer>,
}

impl TripleExtractor {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self { completer }
    }

    /// Extract triples from `text`.
    ///
    /// # Errors
    ///
    /// Fails if the completion call fails or its response holds no
    /// parseable JSON array. Callers in the ingestion path treat every
    /// error as "zero triples for this chunk".
    pub fn extract(&self, text: &str) -> Result<Vec<Triple>, ExtractionError> {
        let messages = [ChatMessage::user(extraction_prompt(text))];
        let response = self.completer.complete(&messages)?;
        parse_triples(&response)
    }
}

/// Parse a model response into triples.
///
/// Entries that are not objects, or lack a non-blank `subject` or `object`,
/// are dropped. A missing relation becomes `RELATED_TO`; every relation is
/// normalized.
pub fn parse_triples(response: &str) -> Result<Vec<Triple>, ExtractionError> {
    let payload = first_json_array(response).ok_or(ExtractionError::NoJsonArray)?;
    let entries: Vec<Value> = serde_json::from_str(payload)?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let subject = field(entry, "subject")?;
            let object = field(entry, "object")?;
            let relation = field(entry, "relation").unwrap_or_default();
            Some(Triple {
                subject,
                relation: RelationType::normalize(&relation),
                object,
            })
        })
        .collect())
}

/// A non-blank scalar field rendered as a trimmed string.
fn field(entry: &Value, key: &str) -> Option<String> {
    let rendered = match entry.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!rendered.is_empty()).then_some(rendered)
}

/// The first balanced `[...]` substring of `text`. Brackets inside JSON
/// string literals do not count towards the balance.
fn first_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
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
