use crate::config::PinoConfig;
use crate::error;
use burn::LearningRate;
use burn::config::Config;
use burn::lr_scheduler::LrScheduler;
use burn::tensor::backend::Backend;

/// マイルストーン減衰型の学習率スケジューラの設定。
#[derive(Config, Debug)]
pub struct MultiStepLrConfig {
    /// 初期学習率
    pub initial_lr: LearningRate,
    /// 学習率を減衰させるステップ（エポック）
    pub milestones: Vec<usize>,
    /// 減衰率
    #[config(default = 0.5)]
    pub gamma: f64,
}

impl MultiStepLrConfig {
    /// `train.base_lr`・`train.milestones`・`train.scheduler_gamma` から設定を作ります。
    pub fn from_pino(config: &PinoConfig) -> error::Result<Self> {
        Ok(Self::new(config.base_lr()?, config.milestones()?).with_gamma(config.scheduler_gamma()?))
    }

    pub fn init(&self) -> MultiStepLr {
        let mut milestones = self.milestones.clone();
        milestones.sort_unstable();
        MultiStepLr {
            initial_lr: self.initial_lr,
            milestones,
            gamma: self.gamma,
            step: 0,
        }
    }
}

/// ステップ数がマイルストーンを通過するたびに学習率へ `gamma` を掛けるスケジューラ。
///
/// `step()` は現在のステップの学習率を返してからステップを進めます。
#[derive(Clone, Debug)]
pub struct MultiStepLr {
    initial_lr: LearningRate,
    milestones: Vec<usize>,
    gamma: f64,
    step: usize,
}

impl MultiStepLr {
    fn rate_at(&self, step: usize) -> LearningRate {
        let passed = self.milestones.iter().filter(|&&m| m <= step).count();
        self.initial_lr * self.gamma.powi(passed as i32)
    }
}

impl LrScheduler for MultiStepLr {
    type Record<B: Backend> = usize;

    fn step(&mut self) -> LearningRate {
        let lr = self.rate_at(self.step);
        self.step += 1;
        lr
    }

    fn to_record<B: Backend>(&self) -> Self::Record<B> {
        self.step
    }

    fn load_record<B: Backend>(mut self, record: Self::Record<B>) -> Self {
        self.step = record;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn decays_at_milestones() {
        let mut scheduler = MultiStepLrConfig::new(1e-3, vec![2, 4]).init();
        let rates: Vec<f64> = (0..6).map(|_| scheduler.step()).collect();
        let expected = [1e-3, 1e-3, 5e-4, 5e-4, 2.5e-4, 2.5e-4];
        for (rate, want) in rates.iter().zip(expected) {
            assert_relative_eq!(*rate, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn unsorted_milestones_are_accepted() {
        let mut scheduler = MultiStepLrConfig::new(1.0, vec![3, 1])
            .with_gamma(0.1)
            .init();
        let rates: Vec<f64> = (0..4).map(|_| scheduler.step()).collect();
        assert_relative_eq!(rates[0], 1.0);
        assert_relative_eq!(rates[1], 0.1);
        assert_relative_eq!(rates[3], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn reads_pino_config() {
        let config = PinoConfig::from_yaml_str(
            "train:\n  base_lr: 0.01\n  milestones: [10]\n  scheduler_gamma: 0.1\n",
        )
        .unwrap();
        let mut scheduler = MultiStepLrConfig::from_pino(&config).unwrap().init();
        assert_relative_eq!(scheduler.step(), 0.01);
    }

    #[test]
    fn config_survives_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scheduler.json");
        MultiStepLrConfig::new(0.1, vec![5]).with_gamma(0.2).save(&path).unwrap();
        let loaded = MultiStepLrConfig::load(&path).unwrap();
        assert_eq!(loaded.milestones, vec![5]);
        assert_relative_eq!(loaded.gamma, 0.2);
    }

    #[test]
    fn record_restores_position() {
        type B = burn::backend::NdArray<f32>;
        let mut scheduler = MultiStepLrConfig::new(1.0, vec![1]).init();
        scheduler.step();
        let record = scheduler.to_record::<B>();
        let mut restored = MultiStepLrConfig::new(1.0, vec![1])
            .init()
            .load_record::<B>(record);
        assert_relative_eq!(restored.step(), 0.5);
    }
}
