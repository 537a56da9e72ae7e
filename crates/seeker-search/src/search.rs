//! Brute-force cosine nearest-neighbour search over an in-memory matrix.
//!
//! Kept free of any resource or text concerns so it can be replaced by an
//! approximate index without touching the callers.

use anyhow::Result;
use candle_core::{Device, Tensor};
use std::cmp::Ordering;

use seeker_core::error::Error;
use seeker_core::types::CorpusHit;
use seeker_embed::l2_normalize_rows;

/// L2-normalize every corpus row once so each query only needs a matmul.
pub fn normalize_corpus(corpus: &Tensor) -> Result<Tensor> {
    l2_normalize_rows(corpus)
}

/// Cosine similarity between `query` (`D`) and every row of `unit_corpus`
/// (`[N, D]`, rows already L2-normalized by [`normalize_corpus`]).
pub fn cosine_scores(query: &[f32], unit_corpus: &Tensor) -> Result<Vec<f32>> {
    let (rows, dim) = unit_corpus.dims2()?;
    if query.len() != dim {
        return Err(Error::DimensionMismatch { expected: dim, actual: query.len() }.into());
    }
    if rows == 0 {
        return Ok(Vec::new());
    }
    let q = Tensor::from_slice(query, (1, dim), &Device::Cpu)?
        .to_device(unit_corpus.device())?
        .to_dtype(unit_corpus.dtype())?;
    let q = l2_normalize_rows(&q)?.t()?.contiguous()?;
    Ok(unit_corpus.matmul(&q)?.squeeze(1)?.to_vec1::<f32>()?)
}

/// Highest `k` scores, descending; equal scores keep ascending corpus order.
/// `k` larger than the number of scores returns every row.
pub fn top_k(scores: &[f32], k: usize) -> Vec<CorpusHit> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }
    let mut hits: Vec<CorpusHit> = scores
        .iter()
        .enumerate()
        .map(|(corpus_id, &score)| CorpusHit { corpus_id, score })
        .collect();
    if k < hits.len() {
        hits.select_nth_unstable_by(k - 1, rank_order);
        hits.truncate(k);
    }
    hits.sort_by(rank_order);
    hits
}

fn rank_order(a: &CorpusHit, b: &CorpusHit) -> Ordering {
    // NaN never outranks a real score.
    let key = |s: f32| if s.is_nan() { f32::NEG_INFINITY } else { s };
    key(b.score)
        .total_cmp(&key(a.score))
        .then_with(|| a.corpus_id.cmp(&b.corpus_id))
}

/// Rank every row of a normalized corpus against `query` and keep the best `k`.
pub fn semantic_search(query: &[f32], unit_corpus: &Tensor, k: usize) -> Result<Vec<CorpusHit>> {
    let scores = cosine_scores(query, unit_corpus)?;
    Ok(top_k(&scores, k))
}
