//! # 学習ループ
//!
//! ダルシー流とバーガース方程式の2つの学習ルーチンを提供します。
//! どちらも同じ骨格で、エポックごとに全バッチの順伝播・パディングの切り落とし・
//! 重み付き損失の合計・逆伝播・オプティマイザ更新を行い、エポック終了時に
//! スケジューラを1ステップ進めてメトリクスを報告します。

mod burgers;
mod darcy;

use crate::checkpoint::{CheckpointWriter, MpkCheckpointer};
use crate::config::PinoConfig;
use crate::error::{self, PinoError};
use crate::logger::{ExperimentLogger, NoopLogger, RunInfo};
use crate::metrics::{EpochMetrics, MetricNames, MetricsHistory};
use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use indicatif::{ProgressBar, ProgressStyle};

/// 学習実行ごとのオプション。
#[derive(Config, Debug)]
pub struct RunOptions {
    /// 分散実行時のプロセス番号。実験ロガーはランク0でのみ有効になります。
    #[config(default = 0)]
    pub rank: usize,
    /// 実験ロガーを使うかどうか
    #[config(default = false)]
    pub log: bool,
    #[config(default = "String::from(\"PINO-2d-default\")")]
    pub project: String,
    #[config(default = "String::from(\"default\")")]
    pub group: String,
    #[config(default = "vec![String::from(\"default\")]")]
    pub tags: Vec<String>,
    /// エポックの進捗バーを表示するかどうか
    #[config(default = true)]
    pub use_progress: bool,
    /// 教師データの順伝播で使う空間パディング
    #[config(default = 4)]
    pub padding: usize,
    /// コロケーション点の順伝播で使う空間パディング
    #[config(default = 4)]
    pub pde_padding: usize,
    /// バーガースでもモリファイアを掛けるかどうか
    #[config(default = false)]
    pub burgers_mollifier: bool,
    /// バーガースの途中経過スナップショットの間隔（エポック）。0で無効。
    #[config(default = 100)]
    pub snapshot_every: usize,
}

impl RunOptions {
    /// ダルシー流の既定値（パディング 4）
    pub fn darcy() -> Self {
        Self::new()
    }

    /// バーガース方程式の既定値（パディング 2）
    pub fn burgers() -> Self {
        Self::new().with_padding(2).with_pde_padding(2)
    }

    /// 設定ファイルに `log.project`・`log.group` があれば既定値を上書きします。
    pub fn with_log_section(mut self, config: &PinoConfig) -> Self {
        if let Some(project) = config.project() {
            self.project = project.to_string();
        }
        if let Some(group) = config.group() {
            self.group = group.to_string();
        }
        self
    }
}

/// 学習の結果。
#[derive(Debug)]
pub struct TrainOutcome<M, O> {
    pub model: M,
    pub optimizer: O,
    pub history: MetricsHistory,
}

/// 学習ルーチンの実行者。
///
/// 設定・実行オプション・実験ロガー・チェックポイントの書き出し先をまとめて保持します。
pub struct Trainer<'a, C = MpkCheckpointer> {
    config: &'a PinoConfig,
    options: RunOptions,
    logger: Box<dyn ExperimentLogger + 'a>,
    checkpoints: C,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a PinoConfig, options: RunOptions) -> Self {
        Self {
            config,
            options,
            logger: Box::new(NoopLogger),
            checkpoints: MpkCheckpointer,
        }
    }
}

impl<'a, C: CheckpointWriter> Trainer<'a, C> {
    /// 実験ロガーを差し替えます。
    pub fn with_logger(mut self, logger: impl ExperimentLogger + 'a) -> Self {
        self.logger = Box::new(logger);
        self
    }

    /// チェックポイントの書き出し先を差し替えます。
    pub fn with_checkpoints<C2: CheckpointWriter>(self, checkpoints: C2) -> Trainer<'a, C2> {
        Trainer {
            config: self.config,
            options: self.options,
            logger: self.logger,
            checkpoints,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    fn logging_enabled(&self) -> bool {
        self.options.log && self.options.rank == 0
    }

    fn start_run(&mut self) -> error::Result<()> {
        if !self.logging_enabled() {
            return Ok(());
        }
        let info = RunInfo {
            project: self.options.project.clone(),
            entity: self.config.entity()?,
            group: self.options.group.clone(),
            config: self.config.to_json()?,
            tags: self.options.tags.clone(),
        };
        self.logger.log_run_start(&info)
    }

    fn log_epoch(
        &mut self,
        epoch: usize,
        metrics: &EpochMetrics,
        names: &MetricNames,
    ) -> error::Result<()> {
        if !self.logging_enabled() {
            return Ok(());
        }
        self.logger.log_metrics(epoch, &metrics.to_record(names))
    }

    fn end_run(&mut self) -> error::Result<()> {
        if !self.logging_enabled() {
            return Ok(());
        }
        self.logger.log_run_end()
    }

    fn progress_bar(&self, epochs: usize) -> ProgressBar {
        if !self.options.use_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb
    }
}

/// 順伝播の出力 `[N, H, W, C]` から空間方向のパディングを切り落とします。
///
/// `padding` が0のときは何もしません。
pub fn crop_padding<B: Backend>(
    pred: Tensor<B, 4>,
    padding: usize,
) -> error::Result<Tensor<B, 4>> {
    if padding == 0 {
        return Ok(pred);
    }
    let [n, h, w, c] = pred.dims();
    if 2 * padding >= h || 2 * padding >= w {
        return Err(PinoError::shape(format!(
            "padding {padding} leaves nothing of output {:?}",
            pred.dims()
        )));
    }
    Ok(pred.slice([0..n, padding..h - padding, padding..w - padding, 0..c]))
}

/// 予測を正解テンソルと同じ形状に並べ替えます。要素数が一致しなければエラーです。
pub fn fit_to_target<B: Backend>(
    pred: Tensor<B, 4>,
    target: [usize; 3],
) -> error::Result<Tensor<B, 3>> {
    let available: usize = pred.dims().iter().product();
    let wanted: usize = target.iter().product();
    if available != wanted {
        return Err(PinoError::shape(format!(
            "cannot reshape prediction {:?} into target {target:?}",
            pred.dims()
        )));
    }
    Ok(pred.reshape(target))
}

/// [`crop_padding`] と [`fit_to_target`] をまとめて適用します。
pub fn crop_to_target<B: Backend>(
    pred: Tensor<B, 4>,
    padding: usize,
    target: [usize; 3],
) -> error::Result<Tensor<B, 3>> {
    fit_to_target(crop_padding(pred, padding)?, target)
}

fn scalar<B: Backend>(tensor: &Tensor<B, 1>) -> f64 {
    tensor.clone().into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    #[test]
    fn crops_border_cells() {
        let device = Default::default();
        let values: Vec<f32> = (0..36).map(|v| v as f32).collect();
        let pred = Tensor::<TestBackend, 4>::from_data(TensorData::new(values, [1, 6, 6, 1]), &device);
        let cropped = crop_padding(pred, 2).unwrap();
        assert_eq!(cropped.dims(), [1, 2, 2, 1]);
        let kept = cropped.into_data().to_vec::<f32>().unwrap();
        assert_eq!(kept, vec![14.0, 15.0, 20.0, 21.0]);
    }

    #[test]
    fn zero_padding_only_reshapes() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 4>::ones([3, 5, 7, 1], &device);
        let out = crop_to_target(pred, 0, [3, 5, 7]).unwrap();
        assert_eq!(out.dims(), [3, 5, 7]);
    }

    #[test]
    fn oversized_padding_is_rejected() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 4>::ones([1, 4, 4, 1], &device);
        assert!(matches!(crop_padding(pred, 2), Err(PinoError::Shape(_))));
    }

    #[test]
    fn reshape_checks_element_count() {
        let device = Default::default();
        let pred = Tensor::<TestBackend, 4>::ones([2, 3, 3, 1], &device);
        assert!(matches!(fit_to_target(pred, [2, 3, 4]), Err(PinoError::Shape(_))));
    }

    #[test]
    fn option_defaults_per_routine() {
        let darcy = RunOptions::darcy();
        assert_eq!((darcy.padding, darcy.pde_padding), (4, 4));
        assert_eq!(darcy.tags, vec!["default".to_string()]);
        assert_eq!(darcy.project, "PINO-2d-default");
        let burgers = RunOptions::burgers();
        assert_eq!((burgers.padding, burgers.pde_padding), (2, 2));
        assert_eq!(burgers.snapshot_every, 100);
    }

    #[test]
    fn log_section_overrides_run_names() {
        let yaml = "log:\n  project: PINO-Darcy-pretrain\n  group: FDM\n";
        let config = PinoConfig::from_yaml_str(yaml).unwrap();
        let options = RunOptions::darcy().with_log_section(&config);
        assert_eq!(options.project, "PINO-Darcy-pretrain");
        assert_eq!(options.group, "FDM");

        let partial = PinoConfig::from_yaml_str("log:\n  group: FDM\n").unwrap();
        let options = RunOptions::burgers().with_log_section(&partial);
        assert_eq!(options.project, "PINO-2d-default");
        assert_eq!(options.group, "FDM");
    }

    #[test]
    fn options_survive_a_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        let options = RunOptions::burgers().with_rank(3).with_tags(vec!["sweep".into()]);
        options.save(&path).unwrap();
        let loaded = RunOptions::load(&path).unwrap();
        assert_eq!(loaded.rank, 3);
        assert_eq!(loaded.tags, vec!["sweep".to_string()]);
        assert_eq!((loaded.padding, loaded.pde_padding), (2, 2));
    }
}
