pub mod engine;
pub mod error;
pub mod filter;
pub mod index;
pub mod saved;
pub mod tokenizer;

pub use engine::{IndexStats, SearchEngine};
pub use error::{EngineError, Result};
pub use filter::{run_filtered, DocumentAttributes, FilteredHit, ResultOrder, SearchFilter, TagRef};
pub use index::{Bm25Params, DocId, DocumentVector, IndexGeneration, TermId};
pub use saved::{SavedSearch, SavedSearchStore};
