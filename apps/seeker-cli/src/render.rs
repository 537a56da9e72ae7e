use anyhow::Result;

use seeker_core::types::{CorpusStats, SimilarQuestion};

const QUESTION_HEADER: &str = "Question";
const SCORE_HEADER: &str = "Similarity score (in %)";

/// Numbered two-column table, one row per result.
pub fn render_table(results: &[SimilarQuestion]) -> String {
    let width = results
        .iter()
        .map(|r| r.question.chars().count())
        .chain(std::iter::once(QUESTION_HEADER.len()))
        .max()
        .unwrap_or(0);
    let mut out = format!("{:>3}  {:<width$}  {}\n", "#", QUESTION_HEADER, SCORE_HEADER);
    out.push_str(&format!("{:>3}  {}  {}\n", "-", "-".repeat(width), "-".repeat(SCORE_HEADER.len())));
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:<width$}  {:>w2$.1}\n",
            i + 1,
            r.question,
            r.similarity_score,
            w2 = SCORE_HEADER.len()
        ));
    }
    out
}

pub fn render_json(results: &[SimilarQuestion]) -> Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

pub fn render_stats(stats: &CorpusStats) -> String {
    format!("📊 {} questions, {}-dim embeddings, model {}", stats.rows, stats.dim, stats.model_id)
}
