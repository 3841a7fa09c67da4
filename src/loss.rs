//! # 損失関数
//!
//! データ損失には相対Lpノルム [`LpLoss`] を使います。
//! PDE残差の計算式は問題ごとに外部から与えられ、
//! [`DarcyResidual`] と [`BurgersResidual`] を通して呼び出されます。

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// 相対Lpノルム誤差 `‖pred − y‖_p / ‖y‖_p`。
///
/// サンプルごとに計算し、`size_average` が真ならバッチ平均、偽なら総和を返します。
#[derive(Clone, Copy, Debug)]
pub struct LpLoss {
    pub p: f64,
    pub size_average: bool,
}

impl Default for LpLoss {
    fn default() -> Self {
        Self {
            p: 2.0,
            size_average: true,
        }
    }
}

impl LpLoss {
    pub fn new(p: f64, size_average: bool) -> Self {
        Self { p, size_average }
    }

    fn norms<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, 2> {
        let n = x.dims()[0];
        x.reshape([n as i32, -1])
            .abs()
            .powf_scalar(self.p)
            .sum_dim(1)
            .powf_scalar(1.0 / self.p)
    }

    /// 相対誤差を計算します。`pred` と `target` は同じ形状でなければなりません。
    pub fn forward<B: Backend, const D: usize>(
        &self,
        pred: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        let diff = self.norms(pred - target.clone());
        let reference = self.norms(target);
        let ratio = (diff / reference).flatten::<1>(0, 1);
        if self.size_average {
            ratio.mean()
        } else {
            ratio.sum()
        }
    }
}

/// ダルシー流のPDE残差損失。
pub trait DarcyResidual<B: Backend> {
    /// 予測された圧力場 `pred [N, H, W]` と透水係数場 `a [N, H, W]` から残差損失を返します。
    fn darcy_loss(&self, pred: Tensor<B, 3>, a: Tensor<B, 3>) -> Tensor<B, 1>;
}

impl<B: Backend, F> DarcyResidual<B> for F
where
    F: Fn(Tensor<B, 3>, Tensor<B, 3>) -> Tensor<B, 1>,
{
    fn darcy_loss(&self, pred: Tensor<B, 3>, a: Tensor<B, 3>) -> Tensor<B, 1> {
        self(pred, a)
    }
}

/// バーガース方程式の損失項。
#[derive(Clone, Debug)]
pub struct BurgersLoss<B: Backend> {
    /// 初期条件の残差
    pub loss_u: Tensor<B, 1>,
    /// PDE残差
    pub loss_f: Tensor<B, 1>,
}

/// バーガース方程式のPDE残差損失。
pub trait BurgersResidual<B: Backend> {
    /// 時空間上の予測 `pred [N, T, X]` と初期条件 `u0 [N, X]` から損失項を返します。
    fn pino_loss(&self, pred: Tensor<B, 3>, u0: Tensor<B, 2>) -> BurgersLoss<B>;
}

impl<B: Backend, F> BurgersResidual<B> for F
where
    F: Fn(Tensor<B, 3>, Tensor<B, 2>) -> BurgersLoss<B>,
{
    fn pino_loss(&self, pred: Tensor<B, 3>, u0: Tensor<B, 2>) -> BurgersLoss<B> {
        self(pred, u0)
    }
}
