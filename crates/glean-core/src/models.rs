use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{Error as _, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AppError, FetchFailure};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The user-agent and header set presented with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_agent: String,
    headers: BTreeMap<String, String>,
}

impl Identity {
    pub fn new(user_agent: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            headers,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Extra headers sent alongside the user-agent.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
}

/// One fetch call: consumed by the fetcher, discarded afterwards.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Attempts = `max_retries + 1`.
    pub max_retries: u32,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            timeout,
            max_retries,
        }
    }
}

/// Response of a single transport attempt, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status_code: u16,
    pub body: String,
    /// URL after redirects.
    pub final_url: String,
}

/// A successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status_code: u16,
    pub body: String,
    pub final_url: String,
    pub attempts: u32,
}

/// Outcome of one fetch. Exactly one variant; never an error past the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success(FetchedPage),
    Failure(FetchFailure),
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchResult::Success(page) => page.attempts,
            FetchResult::Failure(failure) => failure.attempts,
        }
    }

    pub fn into_result(self) -> Result<FetchedPage, FetchFailure> {
        match self {
            FetchResult::Success(page) => Ok(page),
            FetchResult::Failure(failure) => Err(failure),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Ordered mapping of field name to optional value.
///
/// Keys are unique: inserting an existing key replaces its value in place,
/// keeping the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, Option<String>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field. Returns the previous value if the key existed.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: Option<String>,
    ) -> Option<Option<String>> {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    /// Value of a field; `None` if the field is absent or null.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Finite, restartable sequence of records in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Records(Vec<Record>);

impl Records {
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Record> {
        self.0
    }
}

impl From<Vec<Record>> for Records {
    fn from(records: Vec<Record>) -> Self {
        Self(records)
    }
}

impl<'a> IntoIterator for &'a Records {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Records {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// How content should be interpreted by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// JSON if the content starts with `{` or `[`, HTML otherwise.
    #[default]
    Auto,
    Html,
    Json,
}

impl ContentFormat {
    /// Resolve `Auto` against the actual content.
    pub fn resolve(self, content: &str) -> ContentFormat {
        match self {
            ContentFormat::Auto => {
                let trimmed = content.trim_start();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    ContentFormat::Json
                } else {
                    ContentFormat::Html
                }
            }
            other => other,
        }
    }
}

/// A named extraction rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
}

/// Declarative extraction configuration.
///
/// Loaded from JSON such as:
///
/// ```json
/// {
///   "item": ".result",
///   "fields": { "title": ".result-title", "link": ".result-title a[href]" }
/// }
/// ```
///
/// Field order in the file is kept and becomes the preferred column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectors {
    /// Selector for top-level items. Without it, the first field anchors items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,

    #[serde(default)]
    pub format: ContentFormat,

    #[serde(
        serialize_with = "serialize_fields",
        deserialize_with = "deserialize_fields"
    )]
    pub fields: Vec<FieldRule>,
}

impl Selectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn with_format(mut self, format: ContentFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a field rule. A repeated name replaces the earlier selector.
    pub fn field(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        let name = name.into();
        let selector = selector.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(rule) => rule.selector = selector,
            None => self.fields.push(FieldRule { name, selector }),
        }
        self
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Parse selectors from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let selectors: Selectors =
            serde_json::from_str(json).map_err(|e| AppError::Selectors(e.to_string()))?;
        if selectors.fields.is_empty() {
            return Err(AppError::Selectors(
                "at least one field must be declared".into(),
            ));
        }
        Ok(selectors)
    }

    /// Load selectors from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Selectors(format!(
                "Failed to read selectors file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            AppError::Selectors(msg) => {
                AppError::Selectors(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }
}

fn serialize_fields<S: Serializer>(fields: &[FieldRule], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for rule in fields {
        map.serialize_entry(&rule.name, &rule.selector)?;
    }
    map.end()
}

fn deserialize_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<FieldRule>, D::Error> {
    struct FieldsVisitor;

    impl<'de> Visitor<'de> for FieldsVisitor {
        type Value = Vec<FieldRule>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of field name to selector")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut fields: Vec<FieldRule> = Vec::new();
            while let Some((name, selector)) = map.next_entry::<String, String>()? {
                if fields.iter().any(|f| f.name == name) {
                    return Err(A::Error::custom(format!("duplicate field '{name}'")));
                }
                fields.push(FieldRule { name, selector });
            }
            Ok(fields)
        }
    }

    deserializer.deserialize_map(FieldsVisitor)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Records handed to an exporter for one call, plus preferred leading columns.
#[derive(Debug, Clone, Copy)]
pub struct ExportBatch<'a> {
    pub records: &'a [Record],
    /// Columns written first, even when no record carries them.
    pub columns: &'a [String],
}

impl<'a> ExportBatch<'a> {
    pub fn new(records: &'a [Record]) -> Self {
        Self {
            records,
            columns: &[],
        }
    }

    pub fn with_columns(mut self, columns: &'a [String]) -> Self {
        self.columns = columns;
        self
    }
}

/// A committed export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportOutcome {
    pub rows_written: usize,
    pub columns: Vec<String>,
    pub path: PathBuf,
}
