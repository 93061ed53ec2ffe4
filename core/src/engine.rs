use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::index::{Bm25Params, DocId, IndexGeneration};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub terms: usize,
}

/// The live search engine. Rebuilds produce a new immutable generation
/// off to the side and swap it in under a short write lock; readers
/// clone the `Arc` and never observe a half-built index.
pub struct SearchEngine {
    params: Bm25Params,
    generation: RwLock<Arc<IndexGeneration>>,
}

impl SearchEngine {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            generation: RwLock::new(Arc::new(IndexGeneration::empty(params))),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Bm25Params::default())
    }

    /// Full-corpus rebuild, replacing all previous index state.
    /// Validation happens before the build starts; on failure the
    /// previous generation stays live and searchable.
    pub fn add_documents<S: AsRef<str>>(&self, ids: &[DocId], texts: &[S]) -> Result<()> {
        if ids.len() != texts.len() {
            return Err(EngineError::validation(format!(
                "ids/texts length mismatch: {} vs {}",
                ids.len(),
                texts.len()
            )));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                return Err(EngineError::validation(format!(
                    "duplicate document id {id}"
                )));
            }
        }

        let next = Arc::new(IndexGeneration::build(self.params, ids, texts));
        tracing::info!(
            num_docs = next.doc_count(),
            num_terms = next.term_count(),
            avgdl = next.statistics().avgdl,
            "index rebuilt"
        );
        *self.generation.write() = next;
        Ok(())
    }

    /// Ranked search against the current generation. Concurrent calls
    /// share the generation read-only; an in-flight rebuild is invisible
    /// until its swap.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(DocId, f32)> {
        self.current().search(query, top_k)
    }

    /// Snapshot of the current generation.
    pub fn current(&self) -> Arc<IndexGeneration> {
        self.generation.read().clone()
    }

    pub fn document_count(&self) -> usize {
        self.current().doc_count()
    }

    pub fn stats(&self) -> IndexStats {
        let gen = self.current();
        IndexStats {
            documents: gen.doc_count(),
            terms: gen.term_count(),
        }
    }
}
