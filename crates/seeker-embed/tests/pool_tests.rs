use candle_core::{DType, Device, Tensor};
use seeker_embed::{l2_normalize_rows, masked_mean_l2};

#[test]
fn minilm_shaped_batch_ignores_padding() {
    let dev = Device::Cpu;
    // [B=2, T=6, H=384] as the tokenizer pads it: row 0 has 6 real tokens, row 1 has 3.
    let hidden = Tensor::randn(0f32, 1f32, (2, 6, 384), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0], (2, 6), &dev).unwrap();
    let pooled = masked_mean_l2(&hidden, &mask).unwrap();
    assert_eq!(pooled.dims(), &[2, 384]);

    let norms: Vec<f32> = pooled.sqr().unwrap().sum(1).unwrap().sqrt().unwrap().to_vec1().unwrap();
    assert!(norms.iter().all(|n| (n - 1.0).abs() < 1e-4), "norms={norms:?}");

    // Garbage in the padded positions must not change row 1.
    let noise = Tensor::full(1000f32, (1, 3, 384), &dev).unwrap();
    let row1 = hidden.narrow(0, 1, 1).unwrap();
    let noisy_row1 = Tensor::cat(&[&row1.narrow(1, 0, 3).unwrap(), &noise], 1).unwrap();
    let noisy = Tensor::cat(&[&hidden.narrow(0, 0, 1).unwrap(), &noisy_row1], 0).unwrap();
    let again = masked_mean_l2(&noisy, &mask).unwrap();
    let diff: f32 = (pooled - again).unwrap().abs().unwrap().flatten_all().unwrap().max(0).unwrap().to_scalar().unwrap();
    assert!(diff < 1e-5, "padding leaked into the mean: {diff}");
}

#[test]
fn masked_mean_l2_batch_with_padding() {
    let dev = Device::Cpu;
    // Row 0 uses both tokens, row 1 is padded after its first token.
    let h = Tensor::from_slice(&[1.0f32, 0.0,  3.0, 0.0,
                                 0.0, 2.0,  9.0, 9.0],
                               (2, 2, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1i64, 1, 1, 0], (2, 2), &dev).unwrap().to_dtype(DType::F32).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!((v[0][0] - 1.0).abs() < 1e-5 && v[0][1].abs() < 1e-5, "row0={:?}", v[0]);
    assert!(v[1][0].abs() < 1e-5 && (v[1][1] - 1.0).abs() < 1e-5, "row1={:?}", v[1]);
}

#[test]
fn masked_mean_l2_rejects_mismatched_mask() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((1, 3, 4), DType::F32, &dev).unwrap();
    let mask = Tensor::ones((1, 2), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&h, &mask).is_err());
}

#[test]
fn normalize_rows_unit_norm_and_zero_row_stays_finite() {
    let dev = Device::Cpu;
    let m = Tensor::from_slice(&[3.0f32, 4.0, 0.0, 0.0], (2, 2), &dev).unwrap();
    let v: Vec<Vec<f32>> = l2_normalize_rows(&m).unwrap().to_vec2().unwrap();
    assert!((v[0][0] - 0.6).abs() < 1e-6 && (v[0][1] - 0.8).abs() < 1e-6);
    assert!(v[1].iter().all(|x| x.is_finite() && *x == 0.0));
}
