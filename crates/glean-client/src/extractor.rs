//! Selector-driven record extraction.
//!
//! HTML is queried with CSS selectors via the `scraper` crate; JSON with
//! RFC 6901 pointers (see [`crate::json`]). Both entry points are
//! synchronous because `scraper::Html` is `!Send`; the document never
//! outlives a single call.
//!
//! # Field values
//!
//! A selector ending in a bare attribute test, such as `a[href]` or
//! `img.thumb[src]`, yields that attribute. Any other selector yields the
//! element's text with whitespace runs collapsed to one space.
//!
//! # Items
//!
//! With an `item` selector every field is looked up inside each item. Without
//! one, the first field's matches anchor the records and the other fields
//! are scoped to their anchor (see [`AnchorLayout`]).

use std::collections::HashMap;

use ego_tree::NodeId;
use glean_core::error::ExtractFailure;
use glean_core::models::{ContentFormat, Record, Records, Selectors};
use glean_core::traits::Extractor;
use scraper::{ElementRef, Html, Selector};

use crate::json;

/// [`Extractor`] for HTML and JSON content.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorExtractor;

impl SelectorExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, content: &str, selectors: &Selectors) -> Result<Records, ExtractFailure> {
        let records = match selectors.format.resolve(content) {
            ContentFormat::Json => json::extract(content, selectors)?,
            _ => extract_html(content, selectors)?,
        };
        tracing::debug!(records = records.len(), "Extracted records");
        Ok(records)
    }

    fn probe(&self, content: &str, selectors: &Selectors) -> Result<usize, ExtractFailure> {
        match selectors.format.resolve(content) {
            ContentFormat::Json => json::count_items(content, selectors),
            _ => probe_html(content, selectors),
        }
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

/// A compiled field selector and what to read from its matches.
struct FieldQuery {
    name: String,
    selector: Selector,
    attribute: Option<String>,
}

impl FieldQuery {
    fn compile(name: &str, raw: &str) -> Result<Self, ExtractFailure> {
        Ok(Self {
            name: name.to_string(),
            selector: parse_selector(raw)?,
            attribute: trailing_attribute(raw).map(str::to_string),
        })
    }

    fn value(&self, element: ElementRef<'_>) -> Option<String> {
        match &self.attribute {
            Some(attr) => element.value().attr(attr).map(str::to_string),
            None => Some(normalize_text(element)),
        }
    }
}

fn parse_selector(raw: &str) -> Result<Selector, ExtractFailure> {
    Selector::parse(raw).map_err(|e| ExtractFailure::InvalidSelector {
        selector: raw.to_string(),
        message: e.to_string(),
    })
}

fn compile_fields(selectors: &Selectors) -> Result<Vec<FieldQuery>, ExtractFailure> {
    selectors
        .fields
        .iter()
        .map(|rule| FieldQuery::compile(&rule.name, &rule.selector))
        .collect()
}

/// Name of a bare `[attr]` test closing the selector, if any.
fn trailing_attribute(selector: &str) -> Option<&str> {
    let inner = selector.trim_end().strip_suffix(']')?;
    let start = inner.rfind('[')?;
    let name = inner[start + 1..].trim();
    let bare = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
    bare.then_some(name)
}

fn normalize_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_html(content: &str, selectors: &Selectors) -> Result<Records, ExtractFailure> {
    let fields = compile_fields(selectors)?;
    let document = Html::parse_document(content);

    let records: Vec<Record> = match &selectors.item {
        Some(item) => {
            let item = parse_selector(item)?;
            document
                .select(&item)
                .map(|element| {
                    fields
                        .iter()
                        .map(|f| {
                            let value = element.select(&f.selector).next().and_then(|m| f.value(m));
                            (f.name.as_str(), value)
                        })
                        .collect::<Record>()
                })
                .collect()
        }
        None => anchored_records(&document, &fields),
    };

    Ok(records.into())
}

/// Records anchored on the first field when no item selector is given.
fn anchored_records(document: &Html, fields: &[FieldQuery]) -> Vec<Record> {
    let Some(anchor) = fields.first() else {
        return Vec::new();
    };
    let anchors: Vec<ElementRef<'_>> = document.select(&anchor.selector).collect();
    if anchors.is_empty() {
        return Vec::new();
    }

    let layout = AnchorLayout::new(document, &anchors);
    let columns: Vec<Vec<Option<String>>> = fields[1..]
        .iter()
        .map(|f| layout.assign(document.select(&f.selector), f))
        .collect();

    anchors
        .iter()
        .enumerate()
        .map(|(i, element)| {
            std::iter::once((anchor.name.as_str(), anchor.value(*element)))
                .chain(
                    fields[1..]
                        .iter()
                        .zip(&columns)
                        .map(|(f, col)| (f.name.as_str(), col[i].clone())),
                )
                .collect::<Record>()
        })
        .collect()
}

/// Where each anchor match sits in the document.
///
/// An anchor's scope is its highest ancestor that holds no other anchor;
/// scopes never overlap. A field match inside a scope belongs to that
/// anchor. A match outside every scope belongs to the closest preceding
/// anchor, but only while it stays inside the element that holds that
/// anchor and its neighbours, so page chrome after the last item is not
/// picked up. Each anchor takes its first owned match, then its first
/// loose one.
struct AnchorLayout {
    /// Pre-order (document order) index of every node.
    order: HashMap<NodeId, usize>,
    /// Scope root of each anchor, mapped to the anchor's index.
    scopes: HashMap<NodeId, usize>,
    /// Document-order index of each anchor.
    anchor_order: Vec<usize>,
    /// Nearest ancestor holding more than one anchor, per anchor.
    containers: Vec<Option<NodeId>>,
}

impl AnchorLayout {
    fn new(document: &Html, anchors: &[ElementRef<'_>]) -> Self {
        let order: HashMap<NodeId, usize> = document
            .tree
            .root()
            .descendants()
            .enumerate()
            .map(|(i, node)| (node.id(), i))
            .collect();

        // Anchors at or below each node.
        let mut held: HashMap<NodeId, usize> = HashMap::new();
        for anchor in anchors {
            *held.entry(anchor.id()).or_default() += 1;
            for node in anchor.ancestors() {
                *held.entry(node.id()).or_default() += 1;
            }
        }

        let mut scopes = HashMap::new();
        let mut containers = Vec::with_capacity(anchors.len());
        for (i, anchor) in anchors.iter().enumerate() {
            let mut root = anchor.id();
            let mut container = None;
            for node in anchor.ancestors() {
                if held.get(&node.id()).copied().unwrap_or(0) > 1 {
                    container = Some(node.id());
                    break;
                }
                root = node.id();
            }
            scopes.entry(root).or_insert(i);
            containers.push(container);
        }

        let anchor_order = anchors
            .iter()
            .map(|a| order.get(&a.id()).copied().unwrap_or(0))
            .collect();

        Self {
            order,
            scopes,
            anchor_order,
            containers,
        }
    }

    /// One value per anchor for a field, given its matches in document order.
    fn assign<'a>(
        &self,
        matches: impl Iterator<Item = ElementRef<'a>>,
        query: &FieldQuery,
    ) -> Vec<Option<String>> {
        let count = self.anchor_order.len();
        let mut owned: Vec<Option<ElementRef<'a>>> = vec![None; count];
        let mut loose: Vec<Option<ElementRef<'a>>> = vec![None; count];

        for element in matches {
            if let Some(i) = self.owner(element) {
                owned[i].get_or_insert(element);
            } else if let Some(i) = self.preceding_anchor(element) {
                if self.within_container(element, i) {
                    loose[i].get_or_insert(element);
                }
            }
        }

        owned
            .into_iter()
            .zip(loose)
            .map(|(own, near)| own.or(near).and_then(|m| query.value(m)))
            .collect()
    }

    /// Anchor whose scope contains `element`; the innermost scope wins.
    fn owner(&self, element: ElementRef<'_>) -> Option<usize> {
        std::iter::once(element.id())
            .chain(element.ancestors().map(|node| node.id()))
            .find_map(|id| self.scopes.get(&id).copied())
    }

    fn preceding_anchor(&self, element: ElementRef<'_>) -> Option<usize> {
        let at = *self.order.get(&element.id())?;
        self.anchor_order
            .partition_point(|&anchor| anchor < at)
            .checked_sub(1)
    }

    fn within_container(&self, element: ElementRef<'_>, anchor: usize) -> bool {
        match self.containers[anchor] {
            Some(container) => element.ancestors().any(|node| node.id() == container),
            None => true,
        }
    }
}

fn probe_html(content: &str, selectors: &Selectors) -> Result<usize, ExtractFailure> {
    let anchor = match (&selectors.item, selectors.fields.first()) {
        (Some(item), _) => item.as_str(),
        (None, Some(first)) => first.selector.as_str(),
        (None, None) => return Ok(0),
    };
    let anchor = parse_selector(anchor)?;
    let document = Html::parse_document(content);
    Ok(document.select(&anchor).count())
}
