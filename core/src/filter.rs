use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::Date;

use crate::engine::SearchEngine;
use crate::error::{EngineError, Result};
use crate::index::DocId;

/// Canonical structured attributes for one archived document, supplied
/// by the external document store. The engine never owns documents; it
/// only reads these for filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentAttributes {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub date: Option<Date>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub amount: Option<f64>,
}

/// Tag payloads arrive from callers either as bare names or as
/// `{id, name}` objects; both collapse to the name at this boundary so
/// nothing downstream branches on runtime shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagRef {
    Name(String),
    Full { id: i64, name: String },
}

impl TagRef {
    pub fn into_name(self) -> String {
        match self {
            TagRef::Name(name) => name,
            TagRef::Full { name, .. } => name,
        }
    }
}

/// Secondary ordering for filter-only results, where no relevance score
/// exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrder {
    #[default]
    DateDesc,
    DateAsc,
    IdAsc,
}

/// A filter bundle: optional free-text query plus structured predicates,
/// all AND-combined. A document matches the tag predicate only if it
/// holds every listed tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date_from: Option<Date>,
    #[serde(default)]
    pub date_to: Option<Date>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub order: ResultOrder,
}

fn default_limit() -> usize {
    20
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            query: None,
            category: None,
            date_from: None,
            date_to: None,
            tags: Vec::new(),
            limit: default_limit(),
            order: ResultOrder::default(),
        }
    }
}

impl SearchFilter {
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(EngineError::validation("result limit must be at least 1"));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if to < from {
                return Err(EngineError::validation(format!(
                    "date_to {to} precedes date_from {from}"
                )));
            }
        }
        Ok(())
    }

    pub fn has_query(&self) -> bool {
        self.query.as_deref().is_some_and(|q| !q.trim().is_empty())
    }

    /// Structured predicates only; the free-text query is handled by the
    /// ranker. Date bounds are inclusive.
    pub fn matches(&self, attrs: &DocumentAttributes) -> bool {
        if let Some(category) = &self.category {
            if attrs.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = attrs.date else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| date > to) {
                return false;
            }
        }
        self.tags
            .iter()
            .all(|tag| attrs.tags.iter().any(|have| have == tag))
    }
}

/// A composed result: scored when a free-text query drove the ordering,
/// unscored for filter-only listings.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredHit {
    pub doc_id: DocId,
    pub score: Option<f32>,
}

/// Run a filter bundle through the ranking pipeline. With a query, the
/// whole corpus is ranked first and structured predicates prune the hit
/// list; without one, matching documents are ordered by the filter's
/// secondary key. Either way the list is cut to `limit`.
pub fn run_filtered(
    engine: &SearchEngine,
    attrs: &HashMap<DocId, DocumentAttributes>,
    filter: &SearchFilter,
) -> Result<Vec<FilteredHit>> {
    filter.validate()?;

    let mut hits: Vec<FilteredHit> = if filter.has_query() {
        let query = filter.query.as_deref().unwrap_or_default();
        engine
            .search(query, engine.document_count().max(1))
            .into_iter()
            .filter(|(doc_id, _)| match attrs.get(doc_id) {
                Some(a) => filter.matches(a),
                None => filter.matches(&DocumentAttributes::default()),
            })
            .map(|(doc_id, score)| FilteredHit {
                doc_id,
                score: Some(score),
            })
            .collect()
    } else {
        let mut matched: Vec<(DocId, Option<Date>)> = attrs
            .iter()
            .filter(|(_, a)| filter.matches(a))
            .map(|(&id, a)| (id, a.date))
            .collect();
        match filter.order {
            ResultOrder::DateDesc => {
                matched.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            }
            ResultOrder::DateAsc => {
                matched.sort_unstable_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
            }
            ResultOrder::IdAsc => matched.sort_unstable_by_key(|e| e.0),
        }
        matched
            .into_iter()
            .map(|(doc_id, _)| FilteredHit { doc_id, score: None })
            .collect()
    };

    hits.truncate(filter.limit);
    Ok(hits)
}
