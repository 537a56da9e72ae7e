//! Similar-question search over a precomputed embedding corpus.
//!
//! [`Resources`] owns the memoized model, matrix and question texts;
//! [`get_similar_questions_with_score`] is the one call a front end needs.

pub mod npy;
pub mod pickle;
pub mod questions;
pub mod resources;
pub mod search;

pub use questions::{find_similar_questions, get_similar_questions_with_score, DEFAULT_K};
pub use resources::{shared, FileStamp, Resources};
pub use search::{cosine_scores, normalize_corpus, semantic_search, top_k};
