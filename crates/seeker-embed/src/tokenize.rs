use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Configure truncation to `max_len` and padding to the longest sequence in a batch.
pub fn configure_tokenizer(tokenizer: &mut Tokenizer, max_len: usize) -> Result<u32> {
    let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
    tokenizer
        .with_truncation(Some(TruncationParams { max_length: max_len, ..Default::default() }))
        .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token: "[PAD]".to_string(),
        ..Default::default()
    }));
    Ok(pad_id)
}

/// Encode a batch into `[B, T]` input-id and attention-mask tensors.
pub fn tokenize_batch_on_device(tokenizer: &Tokenizer, texts: &[String], device: &Device) -> Result<(Tensor, Tensor)> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let batch = encodings.len();
    let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
    if batch == 0 || seq_len == 0 {
        return Err(anyhow!("Tokenization produced no tokens"));
    }
    let mut ids = Vec::with_capacity(batch * seq_len);
    let mut mask = Vec::with_capacity(batch * seq_len);
    for enc in &encodings {
        // BatchLongest padding makes every row seq_len long; guard anyway.
        if enc.get_ids().len() != seq_len {
            return Err(anyhow!("Ragged batch: {} vs {} tokens", enc.get_ids().len(), seq_len));
        }
        ids.extend_from_slice(enc.get_ids());
        mask.extend_from_slice(enc.get_attention_mask());
    }
    let input_ids = Tensor::from_vec(ids, (batch, seq_len), device)?;
    let attention_mask = Tensor::from_vec(mask, (batch, seq_len), device)?;
    Ok((input_ids, attention_mask))
}
