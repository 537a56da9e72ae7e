use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, warn};

use seeker_core::error::Error;
use seeker_core::types::{to_percent, CorpusHit, SimilarQuestion};

use crate::resources::Resources;
use crate::search::semantic_search;

pub const DEFAULT_K: usize = 5;

/// Embed `query` and rank the corpus against it.
///
/// Emptiness of `query` is not checked here; front ends reject it first.
/// `k` above the corpus size returns the whole corpus.
pub fn find_similar_questions(resources: &Resources, query: &str, k: usize) -> Result<Vec<CorpusHit>> {
    let model = resources.load_model()?;
    let corpus = resources.load_embeddings()?;

    let start = Instant::now();
    let query_embedding = model.embed_one(query).context("Failed to embed query")?;
    let hits = semantic_search(&query_embedding, corpus, k)?;
    debug!("🔍 top-{} for {:?} in {:.2?}: {:?}", k, query, start.elapsed(), hits);
    Ok(hits)
}

/// Ranked hits joined to their question text, scores as percentages.
pub fn get_similar_questions_with_score(resources: &Resources, query: &str, k: usize) -> Result<Vec<SimilarQuestion>> {
    let questions = resources.load_question_data()?;
    let (rows, _) = resources.load_embeddings()?.dims2()?;
    if rows != questions.len() {
        warn!("embedding rows ({}) and questions ({}) disagree", rows, questions.len());
        return Err(Error::LengthMismatch { embeddings: rows, questions: questions.len() }.into());
    }

    find_similar_questions(resources, query, k)?
        .into_iter()
        .map(|hit| -> Result<SimilarQuestion> {
            let question = questions
                .get(hit.corpus_id)
                .ok_or_else(|| Error::NotFound(format!("question #{}", hit.corpus_id)))?;
            Ok(SimilarQuestion { question: question.clone(), similarity_score: to_percent(hit.score) })
        })
        .collect()
}
