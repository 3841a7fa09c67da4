//! 計算メッシュとモリファイア。
//!
//! モリファイアは境界付近の予測誤差を抑えるための減衰場で、
//! `sin(πx)·sin(πy)·0.001` をメッシュ座標から一度だけ計算します。

use crate::error::{PinoError, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use std::f64::consts::PI;

/// モリファイアの振幅
pub const MOLLIFIER_SCALE: f64 = 0.001;

/// `[0,1]^2` 上の等間隔メッシュを `[s, s, 2]` の座標テンソルとして生成します。
///
/// `mesh[i, j] = (x_i, y_j)` で、両端の点を含みます。
pub fn unit_square_mesh<B: Backend>(s: usize, device: &B::Device) -> Tensor<B, 3> {
    let step = if s > 1 { 1.0 / (s - 1) as f32 } else { 0.0 };
    let mut coords = Vec::with_capacity(s * s * 2);
    for i in 0..s {
        for j in 0..s {
            coords.push(i as f32 * step);
            coords.push(j as f32 * step);
        }
    }
    Tensor::from_data(TensorData::new(coords, [s, s, 2]), device)
}

/// メッシュ座標 `[H, W, 2]` からモリファイア `[H, W]` を計算します。
pub fn mollifier<B: Backend>(mesh: Tensor<B, 3>) -> Result<Tensor<B, 2>> {
    let [h, w, c] = mesh.dims();
    if c < 2 {
        return Err(PinoError::shape(format!(
            "mesh must carry two coordinates per point, got shape [{h}, {w}, {c}]"
        )));
    }
    let x = mesh.clone().slice([0..h, 0..w, 0..1]).reshape([h, w]);
    let y = mesh.slice([0..h, 0..w, 1..2]).reshape([h, w]);
    Ok((x.mul_scalar(PI).sin() * y.mul_scalar(PI).sin()).mul_scalar(MOLLIFIER_SCALE))
}

/// 予測 `[N, H, W]` にモリファイアを掛けます。
///
/// モリファイアの各次元は予測と一致するか1でなければなりません。
pub fn mollify<B: Backend>(pred: Tensor<B, 3>, mollifier: &Tensor<B, 2>) -> Result<Tensor<B, 3>> {
    let [_, h, w] = pred.dims();
    let [mh, mw] = mollifier.dims();
    let fits = |m: usize, p: usize| m == p || m == 1;
    if !fits(mh, h) || !fits(mw, w) {
        return Err(PinoError::shape(format!(
            "mollifier [{mh}, {mw}] does not broadcast against prediction {:?}",
            pred.dims()
        )));
    }
    Ok(pred * mollifier.clone().unsqueeze::<3>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn mesh_spans_unit_square() {
        let device = Default::default();
        let mesh = unit_square_mesh::<TestBackend>(5, &device);
        assert_eq!(mesh.dims(), [5, 5, 2]);
        let values = mesh.into_data().to_vec::<f32>().unwrap();
        // mesh[0, 0] と mesh[4, 4]
        assert_eq!(&values[0..2], &[0.0, 0.0]);
        assert_eq!(&values[values.len() - 2..], &[1.0, 1.0]);
        // mesh[1, 3] = (0.25, 0.75)
        let k = (1 * 5 + 3) * 2;
        assert_abs_diff_eq!(values[k], 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(values[k + 1], 0.75, epsilon = 1e-6);
    }

    #[test]
    fn mollifier_vanishes_on_boundary() {
        let device = Default::default();
        let mesh = unit_square_mesh::<TestBackend>(5, &device);
        let m = mollifier(mesh).unwrap();
        assert_eq!(m.dims(), [5, 5]);
        let values = m.into_data().to_vec::<f32>().unwrap();
        for i in 0..5 {
            assert_abs_diff_eq!(values[i], 0.0, epsilon = 1e-8);
            assert_abs_diff_eq!(values[i * 5], 0.0, epsilon = 1e-8);
        }
        // 中心で最大値 0.001
        assert_abs_diff_eq!(values[2 * 5 + 2], 0.001, epsilon = 1e-7);
    }

    #[test]
    fn mollify_rejects_mismatched_grid() {
        let device = Default::default();
        let m = mollifier(unit_square_mesh::<TestBackend>(4, &device)).unwrap();
        let pred = Tensor::<TestBackend, 3>::ones([2, 5, 5], &device);
        assert!(matches!(mollify(pred, &m), Err(PinoError::Shape(_))));
    }

    #[test]
    fn mollify_scales_each_sample() {
        let device = Default::default();
        let m = mollifier(unit_square_mesh::<TestBackend>(3, &device)).unwrap();
        let pred = Tensor::<TestBackend, 3>::ones([2, 3, 3], &device).mul_scalar(2.0);
        let out = mollify(pred, &m).unwrap();
        assert_eq!(out.dims(), [2, 3, 3]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert_abs_diff_eq!(values[4], 0.002, epsilon = 1e-7);
        assert_abs_diff_eq!(values[9 + 4], 0.002, epsilon = 1e-7);
    }
}
