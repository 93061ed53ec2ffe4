use anyhow::Result;
use archivist_core::{
    run_filtered, DocId, DocumentAttributes, EngineError, IndexStats, SavedSearchStore,
    SearchEngine, SearchFilter, TagRef,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use time::Date;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// One entry of the in-process document store the engine reads
/// structured attributes from.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub text: String,
    pub attrs: DocumentAttributes,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub docs: Arc<RwLock<HashMap<DocId, DocumentRecord>>>,
    pub saved: Arc<SavedSearchStore>,
}

/// Engine errors mapped onto the HTTP boundary: validation is the
/// caller's fault, missing saved searches are 404, empty result lists
/// are never errors.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct DocumentPayload {
    pub id: DocId,
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub date: Option<Date>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize {
    20
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f32,
    pub category: Option<String>,
    pub date: Option<Date>,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct FilteredResponse {
    pub total: usize,
    pub results: Vec<FilteredResult>,
}

#[derive(Serialize)]
pub struct FilteredResult {
    pub doc_id: DocId,
    pub score: Option<f32>,
    pub category: Option<String>,
    pub date: Option<Date>,
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct SaveSearchRequest {
    pub name: String,
    #[serde(default)]
    pub filter: SearchFilter,
}

pub fn build_app(data_dir: &std::path::Path) -> Result<Router> {
    let saved = SavedSearchStore::open(data_dir.join("saved_searches"))?;
    let state = AppState {
        engine: Arc::new(SearchEngine::with_defaults()),
        docs: Arc::new(RwLock::new(HashMap::new())),
        saved: Arc::new(saved),
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/stats", get(stats_handler))
        .route("/api/documents", put(put_documents))
        .route("/api/search", post(advanced_search))
        .route("/api/search/saved", get(list_saved).post(save_search))
        .route("/api/search/saved/:id", delete(delete_saved))
        .route("/api/search/saved/:id/execute", post(execute_saved))
        .with_state(state)
        .layer(cors);
    Ok(app)
}

/// Replace the corpus and rebuild the index. The engine validates before
/// touching state, so a bad payload leaves the previous corpus live.
pub async fn put_documents(
    State(state): State<AppState>,
    Json(payload): Json<Vec<DocumentPayload>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ids: Vec<DocId> = payload.iter().map(|d| d.id).collect();
    let texts: Vec<&str> = payload.iter().map(|d| d.text.as_str()).collect();
    state.engine.add_documents(&ids, &texts)?;

    let mut docs = state.docs.write();
    docs.clear();
    for d in payload {
        let attrs = DocumentAttributes {
            category: d.category,
            subcategory: d.subcategory,
            date: d.date,
            tags: d.tags.into_iter().map(TagRef::into_name).collect(),
            amount: d.amount,
        };
        docs.insert(d.id, DocumentRecord { text: d.text, attrs });
    }
    let indexed = docs.len();
    tracing::info!(indexed, "corpus replaced");
    Ok(Json(json!({ "indexed": indexed })))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);
    let ranked = state.engine.search(&params.q, k);
    let total_hits = ranked.len();

    // Raw query terms for snippet highlighting.
    let raw_terms: Vec<String> = params.q.split_whitespace().map(str::to_string).collect();
    let docs = state.docs.read();
    let results = ranked
        .into_iter()
        .map(|(doc_id, score)| match docs.get(&doc_id) {
            Some(rec) => SearchHit {
                doc_id,
                score,
                category: rec.attrs.category.clone(),
                date: rec.attrs.date,
                snippet: snippet_for(&rec.text, &raw_terms),
            },
            None => SearchHit {
                doc_id,
                score,
                category: None,
                date: None,
                snippet: None,
            },
        })
        .collect();

    Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits,
        results,
    })
}

pub async fn advanced_search(
    State(state): State<AppState>,
    Json(filter): Json<SearchFilter>,
) -> Result<Json<FilteredResponse>, ApiError> {
    Ok(Json(compose(&state, &filter)?))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.engine.stats())
}

pub async fn list_saved(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let searches = state.saved.list()?;
    Ok(Json(json!({ "searches": searches })))
}

pub async fn save_search(
    State(state): State<AppState>,
    Json(req): Json<SaveSearchRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let id = state.saved.save(&req.name, req.filter)?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn execute_saved(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<FilteredResponse>, ApiError> {
    let saved = state.saved.get(id)?;
    Ok(Json(compose(&state, &saved.filter)?))
}

pub async fn delete_saved(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.saved.delete(id)?;
    Ok(Json(json!({ "deleted": id })))
}

/// Run a filter bundle through the ranking pipeline against the current
/// corpus and decorate hits with their stored attributes.
fn compose(state: &AppState, filter: &SearchFilter) -> Result<FilteredResponse, EngineError> {
    let docs = state.docs.read();
    let attrs: HashMap<DocId, DocumentAttributes> =
        docs.iter().map(|(&id, rec)| (id, rec.attrs.clone())).collect();
    let hits = run_filtered(&state.engine, &attrs, filter)?;

    let results = hits
        .into_iter()
        .map(|hit| {
            let rec = docs.get(&hit.doc_id);
            FilteredResult {
                doc_id: hit.doc_id,
                score: hit.score,
                category: rec.and_then(|r| r.attrs.category.clone()),
                date: rec.and_then(|r| r.attrs.date),
                tags: rec.map(|r| r.attrs.tags.clone()).unwrap_or_default(),
            }
        })
        .collect::<Vec<_>>();
    Ok(FilteredResponse {
        total: results.len(),
        results,
    })
}

fn snippet_for(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    // First case-insensitive match of any raw query term.
    let mut first_idx: Option<usize> = None;
    for term in raw_terms {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(term))
            .case_insensitive(true)
            .build()
        else {
            continue;
        };
        if let Some(m) = pat.find(text) {
            first_idx = Some(m.start());
            break;
        }
    }
    let snippet = match first_idx {
        Some(idx) => {
            let mut start = idx.saturating_sub(100);
            while !text.is_char_boundary(start) {
                start -= 1;
            }
            let mut end = (idx + 200).min(text.len());
            while !text.is_char_boundary(end) {
                end += 1;
            }
            text[start..end].to_string()
        }
        None => text.chars().take(200).collect(),
    };
    Some(highlight_terms(&snippet, raw_terms))
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        let t = t.trim();
        if t.is_empty() {
            continue;
        }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t))
            .case_insensitive(true)
            .build()
        else {
            continue;
        };
        s = pat
            .replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0]))
            .to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_highlights_matched_terms() {
        let text = "Die Stromrechnung für Januar liegt bei. Abschlag unverändert.";
        let snippet = snippet_for(text, &["stromrechnung".to_string()]).unwrap();
        assert!(snippet.contains("<em>Stromrechnung</em>"));
    }

    #[test]
    fn snippet_falls_back_to_a_prefix() {
        let text = "Versicherungspolice Haftpflicht";
        let snippet = snippet_for(text, &["miete".to_string()]).unwrap();
        assert!(snippet.starts_with("Versicherungspolice"));
    }

    #[test]
    fn snippet_respects_utf8_boundaries() {
        let text = "ä".repeat(400);
        let snippet = snippet_for(&text, &["ä".to_string()]).unwrap();
        assert!(!snippet.is_empty());
    }
}
