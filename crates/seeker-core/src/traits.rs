use crate::error::Error;

/// Text → fixed-length vector. Implementations must be deterministic for a
/// given input so that repeated searches rank identically.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// Identifier of the underlying model; corpus and queries must share it.
    fn model_id(&self) -> &str;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        if out.len() != 1 {
            return Err(Error::Embedding(format!("expected 1 vector, embedder returned {}", out.len())).into());
        }
        Ok(out.remove(0))
    }
}
