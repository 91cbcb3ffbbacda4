//! Decoding of OMDb response bodies.
//!
//! Both parsers work on the raw `serde_json::Value` rather than typed structs
//! so that a single odd field never sinks a whole record.
use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::Movie;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// External ids, in the order the API listed them.
    Found(Vec<String>),
    /// A valid answer with no hits. `reason` carries the API's own message.
    NotFound { reason: Option<String> },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The API answered but refused the lookup (e.g. "Incorrect IMDb ID.").
    #[error("lookup rejected: {0}")]
    Rejected(String),
}

fn parse_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(other) => Err(ParseError::Malformed(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(ParseError::Malformed(e.to_string())),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn api_message(obj: &Map<String, Value>) -> Option<String> {
    obj.get("Error")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Extract the external ids from a title-search response.
pub fn parse_search_response(text: &str) -> Result<SearchOutcome, ParseError> {
    let root = parse_object(text)?;

    let entries = match root.get("Search") {
        None | Some(Value::Null) => {
            return Ok(SearchOutcome::NotFound {
                reason: api_message(&root),
            });
        }
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ParseError::Malformed(format!(
                "`Search` should be an array, got {}",
                kind_of(other)
            )));
        }
    };

    let mut ids = Vec::with_capacity(entries.len());
    let mut seen = HashSet::new();
    for entry in entries {
        let Some(id) = entry
            .get("imdbID")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            tracing::debug!("Skipping search entry without an imdbID: {entry}");
            continue;
        };
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }

    if ids.is_empty() {
        return Ok(SearchOutcome::NotFound {
            reason: api_message(&root),
        });
    }
    Ok(SearchOutcome::Found(ids))
}

/// Read a display field. OMDb spells "unknown" as `"N/A"`.
fn field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    let raw = match obj.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if raw.is_empty() || raw == "N/A" {
        None
    } else {
        Some(raw)
    }
}

/// Map an id-lookup response onto a [`Movie`]. Missing keys become `None`.
pub fn parse_detail_response(text: &str) -> Result<Movie, ParseError> {
    let root = parse_object(text)?;

    if root.get("Response").and_then(Value::as_str) == Some("False") {
        return Err(ParseError::Rejected(
            api_message(&root).unwrap_or_else(|| "no detail available".to_string()),
        ));
    }

    Ok(Movie {
        title: field(&root, "Title"),
        director: field(&root, "Director"),
        cast: field(&root, "Actors"),
        rating: field(&root, "imdbRating"),
        language: field(&root, "Language"),
        year: field(&root, "Year"),
        media_type: field(&root, "Type"),
        genre: field(&root, "Genre"),
        poster_url: field(&root, "Poster"),
    })
}
