//! Result types shared by the search crate and its front ends.

use serde::{Deserialize, Serialize};

/// Position of a question in both the embedding matrix and the question array.
pub type CorpusId = usize;

/// One ranked row of the corpus.
///
/// `score` is the raw cosine similarity in [-1, 1]; higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorpusHit {
    pub corpus_id: CorpusId,
    pub score: f32,
}

/// A corpus question joined back to its text, with the score as a percentage
/// rounded to one decimal place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarQuestion {
    pub question: String,
    pub similarity_score: f64,
}

/// Shape of the loaded corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub rows: usize,
    pub dim: usize,
    pub model_id: String,
}

/// `round(score * 100, 1)`.
pub fn to_percent(score: f32) -> f64 {
    (f64::from(score) * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_rounded_to_one_decimal() {
        assert_eq!(to_percent(1.0), 100.0);
        assert_eq!(to_percent(0.0), 0.0);
        assert_eq!(to_percent(0.123_44), 12.3);
        assert_eq!(to_percent(0.876_6), 87.7);
        assert_eq!(to_percent(-0.5), -50.0);
    }

    #[test]
    fn self_similarity_float_noise_still_reads_as_100() {
        assert_eq!(to_percent(0.999_999_94), 100.0);
        assert_eq!(to_percent(1.000_000_1), 100.0);
    }

    #[test]
    fn similar_question_serializes_with_expected_keys() {
        let q = SimilarQuestion { question: "Who is Q?".into(), similarity_score: 42.5 };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["question"], "Who is Q?");
        assert_eq!(v["similarity_score"], 42.5);
    }
}
