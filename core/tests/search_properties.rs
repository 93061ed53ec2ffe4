use std::collections::HashMap;

use archivist_core::{
    run_filtered, Bm25Params, DocId, DocumentAttributes, IndexGeneration, SavedSearchStore,
    SearchEngine, SearchFilter,
};
use tempfile::tempdir;

fn engine_with(docs: &[(DocId, &str)]) -> SearchEngine {
    let engine = SearchEngine::with_defaults();
    let ids: Vec<DocId> = docs.iter().map(|d| d.0).collect();
    let texts: Vec<&str> = docs.iter().map(|d| d.1).collect();
    engine.add_documents(&ids, &texts).unwrap();
    engine
}

#[test]
fn same_corpus_and_query_always_rank_identically() {
    let corpus: Vec<(DocId, &str)> = vec![
        (1, "Stromrechnung Januar 2024 Abschlag"),
        (2, "Versicherung KFZ Vertrag 2024"),
        (3, "Stromrechnung Februar 2024 Abschlag Strom"),
        (4, "Mietvertrag Wohnung Nebenkosten Strom"),
    ];
    let first = engine_with(&corpus).search("Stromrechnung Abschlag 2024", 10);
    for _ in 0..5 {
        let again = engine_with(&corpus).search("Stromrechnung Abschlag 2024", 10);
        assert_eq!(first, again);
    }
}

#[test]
fn returned_scores_are_strictly_positive() {
    let engine = engine_with(&[
        (1, "Stromrechnung Januar 2024"),
        (2, "Versicherung KFZ Vertrag"),
        (3, "Mietvertrag Wohnung Berlin"),
    ]);
    for query in ["Stromrechnung", "Vertrag", "Wohnung Januar"] {
        for (_, score) in engine.search(query, 10) {
            assert!(score > 0.0, "query {query:?} returned score {score}");
        }
    }
}

#[test]
fn results_never_exceed_top_k() {
    let engine = engine_with(&[
        (1, "rechnung strom"),
        (2, "rechnung wasser"),
        (3, "rechnung internet"),
        (4, "rechnung telefon"),
    ]);
    for k in 1..=6 {
        assert!(engine.search("rechnung", k).len() <= k);
    }
}

#[test]
fn empty_queries_return_empty_lists() {
    let engine = engine_with(&[(1, "Stromrechnung Januar 2024")]);
    assert_eq!(engine.search("", 5), vec![]);
    assert_eq!(engine.search("   ", 5), vec![]);
    // Terms absent from the vocabulary are a normal miss, not an error.
    assert_eq!(engine.search("unbekannt", 5), vec![]);
}

#[test]
fn query_discriminates_unrelated_documents() {
    let engine = engine_with(&[
        (1, "Stromrechnung Januar 2024"),
        (2, "Versicherung KFZ Vertrag"),
    ]);
    let hits = engine.search("Stromrechnung", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, 1);
    assert!(hits[0].1 > 0.0);
}

#[test]
fn rebuild_on_unchanged_corpus_is_structurally_idempotent() {
    let ids: Vec<DocId> = vec![1, 2, 3];
    let texts = vec![
        "Stromrechnung Januar 2024",
        "Versicherung KFZ Vertrag",
        "Mietvertrag Wohnung Berlin",
    ];
    let a = IndexGeneration::build(Bm25Params::default(), &ids, &texts);
    let b = IndexGeneration::build(Bm25Params::default(), &ids, &texts);

    assert_eq!(a.vocabulary().terms(), b.vocabulary().terms());
    assert_eq!(a.doc_ids(), b.doc_ids());
    assert_eq!(a.vectors(), b.vectors());
    assert_eq!(a.statistics().df, b.statistics().df);
}

#[test]
fn saved_search_executes_like_the_direct_filter() {
    let engine = engine_with(&[
        (1, "Mietvertrag Wohnung Miete monatlich"),
        (2, "Stromrechnung Januar Miete"),
        (3, "Mietvertrag Garage Miete"),
    ]);
    let mut attrs: HashMap<DocId, DocumentAttributes> = HashMap::new();
    for (id, category) in [(1, "Verträge"), (2, "Rechnungen"), (3, "Verträge")] {
        attrs.insert(
            id,
            DocumentAttributes {
                category: Some(category.to_string()),
                ..Default::default()
            },
        );
    }

    let filter = SearchFilter {
        query: Some("Miete".into()),
        category: Some("Verträge".into()),
        ..Default::default()
    };

    let dir = tempdir().unwrap();
    let store = SavedSearchStore::open(dir.path().join("saved")).unwrap();
    let id = store.save("rent", filter.clone()).unwrap();

    // Execution is re-composition of the stored filter, nothing cached.
    let stored = store.get(id).unwrap();
    let via_store = run_filtered(&engine, &attrs, &stored.filter).unwrap();
    let direct = run_filtered(&engine, &attrs, &filter).unwrap();

    let ids_a: Vec<DocId> = via_store.iter().map(|h| h.doc_id).collect();
    let ids_b: Vec<DocId> = direct.iter().map(|h| h.doc_id).collect();
    assert_eq!(ids_a, ids_b);
    assert!(!ids_a.is_empty());
    assert!(ids_a.iter().all(|id| *id != 2));
}
