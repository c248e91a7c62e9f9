//! Order resolution: infer each document's page position from its filename.
//!
//! Filenames in real uploads are inconsistent: `Раздел 2 стр. 12-14.docx`,
//! `стр.7.docx`, `3-5 Введение.docx`, `Титульный лист.docx`,
//! `0004_стр 9.docx`. Rules are tried from most to least specific and the
//! first hit wins:
//!
//! 1. label + number + dash + number (`стр. 12-14`)
//! 2. label + number + dash (`стр 12-`)
//! 3. label + number (`стр 12`)
//! 4. bare range at the very start of the original filename (`3-5 …`)
//! 5. label anywhere, then the first standalone number in [2, 500]
//! 6. title-page marker → page 1
//! 7. leading `digits_` prefix (`005_Report.docx`)
//!
//! Rules 1–4 and 7 accept numbers in [1, 1000]. Nothing matching leaves the
//! key [`OrderKey::Unresolved`], which sorts last.

use crate::config::OrderRules;
use crate::document::{Document, OrderKey};
use crate::error::AssemblyError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use tracing::debug;

const STRICT_RANGE: RangeInclusive<u64> = 1..=1000;
const LOOSE_RANGE: RangeInclusive<u64> = 2..=500;

static RE_BARE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)\s*[-–]\s*[0-9]+").unwrap());

static RE_NUMERIC_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9]+)_(.+)$").unwrap());

static RE_NUMBER_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([0-9]+)\b").unwrap());

static DEFAULT_RESOLVER: Lazy<OrderResolver> = Lazy::new(|| {
    OrderResolver::new(&OrderRules::default()).expect("default order rules compile")
});

/// Compiled order-inference rules.
#[derive(Debug, Clone)]
pub struct OrderResolver {
    label_range: Regex,
    label_dash: Regex,
    label_number: Regex,
    label_tail: Regex,
    title_markers: Vec<String>,
}

impl Default for OrderResolver {
    fn default() -> Self {
        DEFAULT_RESOLVER.clone()
    }
}

impl OrderResolver {
    pub fn new(rules: &OrderRules) -> Result<Self, AssemblyError> {
        let labels = rules
            .page_labels
            .iter()
            .map(|l| regex::escape(&l.trim().to_lowercase()))
            .collect::<Vec<_>>();
        if labels.is_empty() {
            return Err(AssemblyError::InvalidConfig(
                "At least one page label is required".into(),
            ));
        }
        let label = format!("(?:{})", labels.join("|"));
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| AssemblyError::InvalidConfig(e.to_string()))
        };

        Ok(Self {
            label_range: compile(format!(r"{label}\s*[.,]?\s*([0-9]+)\s*[-–]\s*[0-9]+"))?,
            label_dash: compile(format!(r"{label}\s*[.,]?\s*([0-9]+)\s*[-–]"))?,
            label_number: compile(format!(r"{label}\s*[.,]?\s*([0-9]+)"))?,
            label_tail: compile(format!(r"{label}\s*[.,]?\s*(.+)"))?,
            title_markers: rules
                .title_markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        })
    }

    /// Infer the order key for a filename. Deterministic for a given filename.
    pub fn order_key(&self, filename: &str) -> OrderKey {
        let lower = filename.to_lowercase();

        for re in [&self.label_range, &self.label_dash, &self.label_number] {
            if let Some(n) = first_number(re, &lower) {
                if STRICT_RANGE.contains(&n) {
                    return page(n);
                }
            }
        }

        if let Some(n) = first_number(&RE_BARE_RANGE, filename) {
            if STRICT_RANGE.contains(&n) {
                return page(n);
            }
        }

        if let Some(caps) = self.label_tail.captures(&lower) {
            let tail = caps.get(1).map_or("", |m| m.as_str());
            let hit = RE_NUMBER_TOKEN
                .captures_iter(tail)
                .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
                .find(|n| LOOSE_RANGE.contains(n));
            if let Some(n) = hit {
                return page(n);
            }
        }

        if self.title_markers.iter().any(|m| lower.contains(m.as_str())) {
            return OrderKey::Page(1);
        }

        if let Some(n) = first_number(&RE_NUMERIC_PREFIX, filename) {
            if STRICT_RANGE.contains(&n) {
                return page(n);
            }
        }

        OrderKey::Unresolved
    }

    /// Build a [`Document`] for a harvested path.
    pub fn resolve_document(&self, path: PathBuf) -> Document {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Document {
            order_key: self.order_key(&filename),
            logical_name: logical_name(&filename).to_string(),
            filename,
            path,
        }
    }

    /// Resolve, deduplicate, and sort harvested paths.
    ///
    /// Duplicates share `(order_key, logical_name)`; the first one in input
    /// order is kept. The sort is stable, so documents with equal keys keep
    /// their harvest order, and unresolved documents come last.
    pub fn resolve_order(&self, paths: impl IntoIterator<Item = PathBuf>) -> Vec<Document> {
        let mut seen: HashSet<(OrderKey, String)> = HashSet::new();
        let mut documents = Vec::new();

        for path in paths {
            let doc = self.resolve_document(path);
            if !seen.insert((doc.order_key, doc.logical_name.clone())) {
                debug!("Skipping duplicate: {} ({})", doc.filename, doc.order_key);
                continue;
            }
            documents.push(doc);
        }

        documents.sort_by_key(|d| d.order_key);
        documents
    }
}

/// Strip a leading `digits_` prefix: `0003_Глава.docx` → `Глава.docx`.
pub fn logical_name(filename: &str) -> &str {
    RE_NUMERIC_PREFIX
        .captures(filename)
        .and_then(|c| c.get(2))
        .map_or(filename, |m| m.as_str())
}

/// Apply a caller-confirmed order to a resolved list.
///
/// Indices outside `0..documents.len()` are dropped silently; repeats are
/// kept. An empty result is rejected.
pub fn apply_order(documents: &[Document], order: &[i64]) -> Result<Vec<Document>, AssemblyError> {
    let picked: Vec<Document> = order
        .iter()
        .filter_map(|&i| usize::try_from(i).ok())
        .filter_map(|i| documents.get(i).cloned())
        .collect();

    if picked.is_empty() {
        return Err(AssemblyError::EmptyOrder);
    }
    Ok(picked)
}

fn first_number(re: &Regex, haystack: &str) -> Option<u64> {
    re.captures(haystack)?.get(1)?.as_str().parse().ok()
}

fn page(n: u64) -> OrderKey {
    OrderKey::Page(n as u32)
}
