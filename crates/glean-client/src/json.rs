//! Record extraction from JSON with RFC 6901 pointers.
//!
//! `item` points at an array (one record per element) or a single object
//! (one record). Without `item`, the root is used the same way. Field
//! pointers are resolved relative to each item.

use glean_core::error::ExtractFailure;
use glean_core::models::{Record, Records, Selectors};
use serde_json::Value;

pub(crate) fn extract(content: &str, selectors: &Selectors) -> Result<Records, ExtractFailure> {
    for rule in &selectors.fields {
        check_pointer(&rule.selector)?;
    }
    let root = parse(content)?;
    let records: Vec<Record> = items(&root, selectors)?
        .into_iter()
        .map(|item| {
            selectors
                .fields
                .iter()
                .map(|rule| (rule.name.as_str(), item.pointer(&rule.selector).and_then(cell)))
                .collect::<Record>()
        })
        .collect();
    Ok(records.into())
}

pub(crate) fn count_items(content: &str, selectors: &Selectors) -> Result<usize, ExtractFailure> {
    let root = parse(content)?;
    Ok(items(&root, selectors)?.len())
}

fn parse(content: &str) -> Result<Value, ExtractFailure> {
    serde_json::from_str(content).map_err(|e| ExtractFailure::MalformedJson(e.to_string()))
}

fn items<'a>(root: &'a Value, selectors: &Selectors) -> Result<Vec<&'a Value>, ExtractFailure> {
    let target = match &selectors.item {
        Some(pointer) => {
            check_pointer(pointer)?;
            root.pointer(pointer)
        }
        None => Some(root),
    };
    Ok(match target {
        Some(Value::Array(elements)) => elements.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    })
}

fn check_pointer(pointer: &str) -> Result<(), ExtractFailure> {
    if pointer.is_empty() || pointer.starts_with('/') {
        Ok(())
    } else {
        Err(ExtractFailure::InvalidSelector {
            selector: pointer.to_string(),
            message: "JSON Pointer must be empty or start with '/'".to_string(),
        })
    }
}

/// Cell text for a JSON value: strings verbatim, scalars stringified,
/// containers as compact JSON.
fn cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
