use candle_core::{DType, Device, Tensor};
use ragdb_embed::masked_mean_l2;

#[test]
fn masked_mean_ignores_padding() {
    let dev = Device::Cpu;
    // Batch of one, two positions, hidden dim 4; the second position is padding.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], (1, 2, 4), &dev).expect("hidden");
    let mask = Tensor::from_slice(&[1i64, 0i64], (1, 2), &dev).expect("mask").to_dtype(DType::F32).expect("cast");

    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).expect("pool").to_vec2().expect("vec");
    let norm = 30.0f32.sqrt();
    for (a, b) in out[0].iter().zip([1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm]) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}

#[test]
fn rejects_non_3d_hidden_states() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((2, 4), DType::F32, &dev).expect("hidden");
    let mask = Tensor::ones((2, 1), DType::F32, &dev).expect("mask");
    assert!(masked_mean_l2(&h, &mask).is_err());
}
