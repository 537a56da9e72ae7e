use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

fn eps_for(dtype: DType) -> f64 {
    match dtype { DType::F16 | DType::BF16 => 1e-6, _ => 1e-12 }
}

/// Mean over unmasked tokens of `hidden` `[B,T,H]`, then L2-normalized → `[B,H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, time, hidden_dim) = hidden.dims3()?;
    ensure!(attention_mask.dims() == [batch, time], "mask shape {:?} does not match hidden [{batch},{time},_]", attention_mask.dims());

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let sum = (hidden * &mask_3d)?.sum(1)?;
    // Epsilon keeps all-padding rows finite; the scale is normalized away below.
    let lengths = (mask.sum_keepdim(1)? + eps_for(hidden.dtype()))?;
    let mean = sum.broadcast_div(&lengths)?;
    let out = l2_normalize_rows(&mean)?;
    ensure!(out.dims() == [batch, hidden_dim]);
    Ok(out)
}

/// Divide every row of a `[N,D]` matrix by its L2 norm (plus a dtype-dependent epsilon).
pub fn l2_normalize_rows(matrix: &Tensor) -> Result<Tensor> {
    let norm = matrix.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = (norm + eps_for(matrix.dtype()))?;
    Ok(matrix.broadcast_div(&norm)?)
}
