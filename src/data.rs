//! 学習バッチとデータソース。

use crate::error::{PinoError, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::cell::RefCell;

/// 1ステップ分の学習バッチ（チャネル最後のレイアウト）。
///
/// ローダーが生成し、その場で消費されます。
#[derive(Clone, Debug)]
pub struct PinoBatch<B: Backend> {
    /// 教師データの入力 `[N, H, W, C]`
    pub x: Tensor<B, 4>,
    /// 教師データの正解 `[N, H, W]`
    pub y: Tensor<B, 3>,
    /// コロケーション点の入力 `[N, H', W', C']`
    pub pde_x: Tensor<B, 4>,
    /// コロケーション点の正解 `[N, H', W']`
    pub pde_y: Tensor<B, 3>,
}

impl<B: Backend> PinoBatch<B> {
    pub fn new(x: Tensor<B, 4>, y: Tensor<B, 3>, pde_x: Tensor<B, 4>, pde_y: Tensor<B, 3>) -> Self {
        Self { x, y, pde_x, pde_y }
    }

    /// バッチ内のサンプル数
    pub fn len(&self) -> usize {
        self.y.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全テンソルを指定デバイスへ移します。
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            x: self.x.to_device(device),
            y: self.y.to_device(device),
            pde_x: self.pde_x.to_device(device),
            pde_y: self.pde_y.to_device(device),
        }
    }

    fn narrow(&self, start: usize, end: usize) -> Self {
        Self {
            x: self.x.clone().narrow(0, start, end - start),
            y: self.y.clone().narrow(0, start, end - start),
            pde_x: self.pde_x.clone().narrow(0, start, end - start),
            pde_y: self.pde_y.clone().narrow(0, start, end - start),
        }
    }

    fn select(&self, indices: Tensor<B, 1, Int>) -> Self {
        Self {
            x: self.x.clone().select(0, indices.clone()),
            y: self.y.clone().select(0, indices.clone()),
            pde_x: self.pde_x.clone().select(0, indices.clone()),
            pde_y: self.pde_y.clone().select(0, indices),
        }
    }
}

/// 学習ループにバッチを供給するデータソース。
pub trait PinoDataSource<B: Backend> {
    /// 1エポック分のバッチを順に返します。
    fn batches(&self) -> Box<dyn Iterator<Item = PinoBatch<B>> + '_>;

    /// データセット全体のサンプル数
    fn num_samples(&self) -> usize;

    /// 1エポックあたりのバッチ数
    fn num_batches(&self) -> usize;

    /// 教師データのメッシュ座標 `[H, W, 2]`
    fn mesh(&self) -> Option<Tensor<B, 3>> {
        None
    }

    /// コロケーション点のメッシュ座標 `[H', W', 2]`。既定では教師データと同じメッシュ。
    fn pde_mesh(&self) -> Option<Tensor<B, 3>> {
        self.mesh()
    }
}

/// メモリ上のテンソルをバッチに分割して供給するローダー。
///
/// 最後のバッチは `batch_size` より小さくなることがあります（切り捨てません）。
#[derive(Debug)]
pub struct InMemoryLoader<B: Backend> {
    samples: PinoBatch<B>,
    batch_size: usize,
    mesh: Option<Tensor<B, 3>>,
    pde_mesh: Option<Tensor<B, 3>>,
    rng: Option<RefCell<StdRng>>,
}

impl<B: Backend> InMemoryLoader<B> {
    /// 全サンプルを1つの [`PinoBatch`] として受け取り、ローダーを作ります。
    pub fn new(samples: PinoBatch<B>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(PinoError::shape("batch size must be positive"));
        }
        let n = samples.len();
        let counts = [
            samples.x.dims()[0],
            samples.pde_x.dims()[0],
            samples.pde_y.dims()[0],
        ];
        if counts.iter().any(|&c| c != n) {
            return Err(PinoError::shape(format!(
                "sample counts differ between tensors: y={n}, x/pde_x/pde_y={counts:?}"
            )));
        }
        Ok(Self {
            samples,
            batch_size,
            mesh: None,
            pde_mesh: None,
            rng: None,
        })
    }

    /// 教師データのメッシュを設定します。
    pub fn with_mesh(mut self, mesh: Tensor<B, 3>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// コロケーション点のメッシュを設定します。
    pub fn with_pde_mesh(mut self, mesh: Tensor<B, 3>) -> Self {
        self.pde_mesh = Some(mesh);
        self
    }

    /// エポックごとにシード付きでサンプル順をシャッフルします。
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.rng = Some(RefCell::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn epoch_order(&self) -> PinoBatch<B> {
        match &self.rng {
            Some(rng) => {
                let n = self.samples.len();
                let mut order: Vec<i64> = (0..n as i64).collect();
                order.shuffle(&mut *rng.borrow_mut());
                let device = self.samples.y.device();
                let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(order, [n]), &device);
                self.samples.select(indices)
            }
            None => self.samples.clone(),
        }
    }
}

impl<B: Backend> PinoDataSource<B> for InMemoryLoader<B> {
    fn batches(&self) -> Box<dyn Iterator<Item = PinoBatch<B>> + '_> {
        let epoch = self.epoch_order();
        let n = epoch.len();
        let batch_size = self.batch_size;
        Box::new(
            (0..n)
                .step_by(batch_size)
                .map(move |start| epoch.narrow(start, (start + batch_size).min(n))),
        )
    }

    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    fn mesh(&self) -> Option<Tensor<B, 3>> {
        self.mesh.clone()
    }

    fn pde_mesh(&self) -> Option<Tensor<B, 3>> {
        self.pde_mesh.clone().or_else(|| self.mesh.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn samples(n: usize) -> PinoBatch<TestBackend> {
        let device = Default::default();
        let ids: Vec<f32> = (0..n).flat_map(|i| vec![i as f32; 4]).collect();
        let y = Tensor::<TestBackend, 3>::from_data(TensorData::new(ids, [n, 2, 2]), &device);
        PinoBatch::new(
            y.clone().unsqueeze_dim(3),
            y.clone(),
            y.clone().unsqueeze_dim(3),
            y,
        )
    }

    fn first_values(batch: &PinoBatch<TestBackend>) -> Vec<f32> {
        let n = batch.len();
        batch
            .y
            .clone()
            .slice([0..n, 0..1, 0..1])
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    }

    #[test]
    fn keeps_short_last_batch() {
        let loader = InMemoryLoader::new(samples(5), 2).unwrap();
        let sizes: Vec<usize> = loader.batches().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(loader.num_batches(), 3);
        assert_eq!(loader.num_samples(), 5);
    }

    #[test]
    fn preserves_order_without_shuffle() {
        let loader = InMemoryLoader::new(samples(4), 3).unwrap();
        let seen: Vec<f32> = loader.batches().flat_map(|b| first_values(&b)).collect();
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn shuffle_is_a_seeded_permutation() {
        let epoch = |seed| {
            let loader = InMemoryLoader::new(samples(8), 3).unwrap().with_shuffle(seed);
            loader
                .batches()
                .flat_map(|b| first_values(&b))
                .collect::<Vec<f32>>()
        };
        let mut first = epoch(7);
        assert_eq!(first, epoch(7));
        first.sort_by(f32::total_cmp);
        assert_eq!(first, (0..8).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_mismatched_sample_counts() {
        let mut batch = samples(4);
        batch.pde_y = samples(3).pde_y;
        assert!(matches!(InMemoryLoader::new(batch, 2), Err(PinoError::Shape(_))));
    }

    #[test]
    fn pde_mesh_defaults_to_mesh() {
        let device = Default::default();
        let mesh = crate::mesh::unit_square_mesh::<TestBackend>(2, &device);
        let loader = InMemoryLoader::new(samples(2), 1).unwrap().with_mesh(mesh);
        assert_eq!(loader.pde_mesh().unwrap().dims(), [2, 2, 2]);
    }
}
