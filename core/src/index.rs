use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tokenizer::tokenize;

pub type TermId = u32;
pub type DocId = i64;

/// BM25 tuning knobs: `k1` controls term-frequency saturation, `b` how
/// strongly document length is normalized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Bijection between terms and ids. Ids are assigned first-seen-wins in
/// document order, so they are stable within one generation and only
/// comparable within it.
#[derive(Debug, Default, Clone)]
pub struct Vocabulary {
    ids: HashMap<String, TermId>,
    terms: Vec<String>,
}

impl Vocabulary {
    pub fn id(&self, term: &str) -> Option<TermId> {
        self.ids.get(term).copied()
    }

    pub fn term(&self, id: TermId) -> Option<&str> {
        self.terms.get(id as usize).map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn intern(&mut self, term: String) -> TermId {
        if let Some(&id) = self.ids.get(&term) {
            return id;
        }
        let id = self.terms.len() as TermId;
        self.ids.insert(term.clone(), id);
        self.terms.push(term);
        id
    }
}

/// Corpus-wide statistics, computed once per build and never updated
/// incrementally.
#[derive(Debug, Default, Clone)]
pub struct IndexStatistics {
    pub num_docs: u32,
    pub avgdl: f32,
    /// Per-term document frequency, indexed by term id.
    pub df: Vec<u32>,
    /// Per-term inverse document frequency, indexed by term id.
    pub idf: Vec<f32>,
}

/// Sparse BM25-weighted vector for one document, entries sorted by term
/// id ascending.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DocumentVector(pub Vec<(TermId, f32)>);

/// One complete, immutable index snapshot: vocabulary, statistics and
/// document vectors from a single build. Vectors only resolve against
/// this generation's vocabulary; generations are never mixed.
pub struct IndexGeneration {
    params: Bm25Params,
    vocabulary: Vocabulary,
    stats: IndexStatistics,
    doc_ids: Vec<DocId>,
    vectors: Vec<DocumentVector>,
}

impl IndexGeneration {
    pub fn empty(params: Bm25Params) -> Self {
        Self {
            params,
            vocabulary: Vocabulary::default(),
            stats: IndexStatistics::default(),
            doc_ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Build a fresh generation from the full corpus. `ids` and `texts`
    /// must already be validated to the same length; document order
    /// determines term-id assignment.
    pub fn build<S: AsRef<str>>(params: Bm25Params, ids: &[DocId], texts: &[S]) -> Self {
        debug_assert_eq!(ids.len(), texts.len());
        let n = ids.len();

        // Pass 1: vocabulary, per-document term frequencies, lengths.
        let mut vocabulary = Vocabulary::default();
        let mut doc_term_freqs: Vec<HashMap<TermId, u32>> = Vec::with_capacity(n);
        let mut doc_lengths: Vec<u32> = Vec::with_capacity(n);
        let mut total_tokens: u64 = 0;

        for text in texts {
            let tokens = tokenize(text.as_ref());
            doc_lengths.push(tokens.len() as u32);
            total_tokens += tokens.len() as u64;

            let mut freqs: HashMap<TermId, u32> = HashMap::new();
            for token in tokens {
                let tid = vocabulary.intern(token);
                *freqs.entry(tid).or_insert(0) += 1;
            }
            doc_term_freqs.push(freqs);
        }

        let avgdl = if n == 0 {
            0.0
        } else {
            total_tokens as f32 / n as f32
        };

        // Pass 2: document frequency and IDF.
        let mut df = vec![0u32; vocabulary.len()];
        for freqs in &doc_term_freqs {
            for &tid in freqs.keys() {
                df[tid as usize] += 1;
            }
        }
        let n_f = n as f32;
        let idf: Vec<f32> = df
            .iter()
            .map(|&d| ((n_f - d as f32 + 0.5) / (d as f32 + 0.5) + 1.0).ln())
            .collect();

        let stats = IndexStatistics {
            num_docs: n as u32,
            avgdl,
            df,
            idf,
        };

        // Pass 3: BM25 vectors, independent per document.
        let vectors: Vec<DocumentVector> = doc_term_freqs
            .par_iter()
            .zip(doc_lengths.par_iter())
            .map(|(freqs, &doc_len)| weigh(params, &stats, freqs, doc_len))
            .collect();

        Self {
            params,
            vocabulary,
            stats,
            doc_ids: ids.to_vec(),
            vectors,
        }
    }

    /// Rank the corpus against a free-text query. Returns at most `top_k`
    /// hits ordered by score descending, ties broken by doc id ascending.
    /// An empty or fully-pruned query yields an empty list.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(DocId, f32)> {
        let mut query_tf: HashMap<TermId, u32> = HashMap::new();
        for token in tokenize(query) {
            if let Some(tid) = self.vocabulary.id(&token) {
                *query_tf.entry(tid).or_insert(0) += 1;
            }
        }
        if query_tf.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(DocId, f32)> = self
            .vectors
            .par_iter()
            .zip(self.doc_ids.par_iter())
            .filter_map(|(vector, &doc_id)| {
                let mut score = 0.0f32;
                // Sparse dot product: unmatched terms contribute nothing.
                for &(tid, weight) in &vector.0 {
                    if let Some(&count) = query_tf.get(&tid) {
                        score += weight * count as f32;
                    }
                }
                (score > 0.0).then_some((doc_id, score))
            })
            .collect();

        hits.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(top_k);
        hits
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn statistics(&self) -> &IndexStatistics {
        &self.stats
    }

    pub fn doc_ids(&self) -> &[DocId] {
        &self.doc_ids
    }

    pub fn vectors(&self) -> &[DocumentVector] {
        &self.vectors
    }

    pub fn doc_count(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn term_count(&self) -> usize {
        self.vocabulary.len()
    }
}

fn weigh(
    params: Bm25Params,
    stats: &IndexStatistics,
    freqs: &HashMap<TermId, u32>,
    doc_len: u32,
) -> DocumentVector {
    if freqs.is_empty() {
        return DocumentVector::default();
    }
    // avgdl > 0 whenever any document produced tokens.
    let len_norm = 1.0 - params.b + params.b * (doc_len as f32 / stats.avgdl);

    let mut entries: Vec<(TermId, f32)> = freqs
        .iter()
        .map(|(&tid, &tf)| {
            let tf = tf as f32;
            let weight =
                stats.idf[tid as usize] * (tf * (params.k1 + 1.0)) / (tf + params.k1 * len_norm);
            (tid, weight)
        })
        .collect();
    // Sorted by term id for linear-time intersection.
    entries.sort_unstable_by_key(|e| e.0);
    DocumentVector(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(texts: &[&str]) -> IndexGeneration {
        let ids: Vec<DocId> = (1..=texts.len() as i64).collect();
        IndexGeneration::build(Bm25Params::default(), &ids, texts)
    }

    #[test]
    fn vocabulary_ids_are_first_seen_wins() {
        let gen = build(&["alpha beta alpha", "beta gamma"]);
        let vocab = gen.vocabulary();
        assert_eq!(vocab.id("alpha"), Some(0));
        assert_eq!(vocab.id("beta"), Some(1));
        assert_eq!(vocab.id("gamma"), Some(2));
        assert_eq!(vocab.term(2), Some("gamma"));
    }

    #[test]
    fn statistics_match_the_corpus() {
        let gen = build(&["alpha beta alpha", "beta gamma"]);
        let stats = gen.statistics();
        assert_eq!(stats.num_docs, 2);
        // 3 + 2 tokens across 2 documents.
        assert!((stats.avgdl - 2.5).abs() < 1e-6);
        assert_eq!(stats.df, vec![1, 2, 1]);
        // idf("beta") = ln((2 - 2 + 0.5) / (2 + 0.5) + 1)
        assert!((stats.idf[1] - 1.2f32.ln()).abs() < 1e-6);
        assert!((stats.idf[0] - 2.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn vectors_are_sparse_and_sorted() {
        let gen = build(&["gamma alpha gamma beta"]);
        let vector = &gen.vectors()[0];
        let ids: Vec<TermId> = vector.0.iter().map(|e| e.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn empty_document_gets_empty_vector() {
        let gen = build(&["alpha beta", ""]);
        assert!(gen.vectors()[1].0.is_empty());
        // Unscorable, not scored zero.
        let hits = gen.search("alpha", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1);
    }

    #[test]
    fn empty_corpus_builds_an_empty_generation() {
        let gen = IndexGeneration::build::<&str>(Bm25Params::default(), &[], &[]);
        assert_eq!(gen.doc_count(), 0);
        assert_eq!(gen.term_count(), 0);
        assert!(gen.search("anything", 5).is_empty());
    }

    #[test]
    fn scores_follow_the_bm25_formula() {
        // doc 1: "Katze Hund Katze" (len 3), doc 2: "Katze" (len 1).
        let gen = build(&["Katze Hund Katze", "Katze"]);
        let hits = gen.search("Katze", 10);
        assert_eq!(hits.len(), 2);

        let k1 = 1.5f32;
        let b = 0.75f32;
        let avgdl = 2.0f32;
        let idf_katze = ((2.0 - 2.0 + 0.5) / (2.0 + 0.5) + 1.0f32).ln();
        let expected = |tf: f32, dl: f32| {
            let norm = 1.0 - b + b * (dl / avgdl);
            idf_katze * (tf * (k1 + 1.0)) / (tf + k1 * norm)
        };
        let s1 = expected(2.0, 3.0);
        let s2 = expected(1.0, 1.0);

        let by_id: HashMap<DocId, f32> = hits.iter().copied().collect();
        assert!((by_id[&1] - s1).abs() < 1e-5);
        assert!((by_id[&2] - s2).abs() < 1e-5);
        // Ordering must agree with the formula, ties by doc id.
        let mut want = vec![(1i64, s1), (2i64, s2)];
        want.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        let got: Vec<DocId> = hits.iter().map(|h| h.0).collect();
        let want: Vec<DocId> = want.iter().map(|h| h.0).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn tie_break_is_doc_id_ascending() {
        // Identical documents score identically.
        let gen = IndexGeneration::build(
            Bm25Params::default(),
            &[42, 7, 19],
            &["miete wohnung", "miete wohnung", "miete wohnung"],
        );
        let hits = gen.search("miete", 10);
        let ids: Vec<DocId> = hits.iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![7, 19, 42]);
    }
}
