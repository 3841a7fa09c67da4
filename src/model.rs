use burn::module::AutodiffModule;
use burn::tensor::Tensor;
use burn::tensor::backend::AutodiffBackend;

/// 学習対象となるニューラル作用素。
///
/// 入力 `[N, H, W, C]` を受け取り、空間方向に `padding` セルずつ拡張した
/// グリッド上の予測 `[N, H + 2·padding, W + 2·padding, 1]` を返します。
/// パディング部分の切り落としは学習ループ側で行います。
pub trait NeuralOperator<B: AutodiffBackend>: AutodiffModule<B> {
    /// パディング付きで順伝播を実行します。
    fn forward(&self, input: Tensor<B, 4>, padding: usize) -> Tensor<B, 4>;
}
