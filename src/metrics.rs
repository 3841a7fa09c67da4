//! エポックごとの学習メトリクス。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 実験ロガーへ送る1エポック分のレコード（メトリクス名 → 値）。
pub type MetricRecord = BTreeMap<String, f64>;

/// 1バッチ分の損失値。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchLosses {
    pub total: f64,
    pub data: f64,
    pub physics: f64,
}

/// エポック平均の取り方。
///
/// ダルシー流はサンプル数で重み付けした平均、バーガースはバッチ数による単純平均です。
/// 両者の違いは意図的に残しています。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochAverage {
    /// `Σ loss_i · n_i / データセットのサンプル数`
    PerSample,
    /// `Σ loss_i / バッチ数`
    PerBatch,
}

/// エポック平均された損失。
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub train_loss: f64,
    pub data_loss: f64,
    pub f_loss: f64,
}

/// ルーチンごとのメトリクス名。
#[derive(Clone, Copy, Debug)]
pub struct MetricNames {
    pub train_loss: &'static str,
    pub data_loss: &'static str,
    pub f_loss: &'static str,
}

impl MetricNames {
    pub const DARCY: Self = Self {
        train_loss: "train loss",
        data_loss: "data loss",
        f_loss: "f loss",
    };
    pub const BURGERS: Self = Self {
        train_loss: "Train loss",
        data_loss: "Train L2 error",
        f_loss: "Train f error",
    };
}

impl EpochMetrics {
    pub fn to_record(&self, names: &MetricNames) -> MetricRecord {
        MetricRecord::from([
            (names.train_loss.to_string(), self.train_loss),
            (names.data_loss.to_string(), self.data_loss),
            (names.f_loss.to_string(), self.f_loss),
        ])
    }
}

/// エポック内の損失を積算します。エポック開始時に新しく作り直します。
#[derive(Clone, Debug)]
pub struct EpochAccumulator {
    policy: EpochAverage,
    sums: BatchLosses,
    batches: usize,
}

impl EpochAccumulator {
    pub fn new(policy: EpochAverage) -> Self {
        Self {
            policy,
            sums: BatchLosses::default(),
            batches: 0,
        }
    }

    /// `batch_size` 個のサンプルからなるバッチの損失を加算します。
    pub fn add(&mut self, batch_size: usize, losses: BatchLosses) {
        let weight = match self.policy {
            EpochAverage::PerSample => batch_size as f64,
            EpochAverage::PerBatch => 1.0,
        };
        self.sums.total += losses.total * weight;
        self.sums.data += losses.data * weight;
        self.sums.physics += losses.physics * weight;
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// 平均を確定します。`divisor` はサンプル数またはバッチ数です。
    pub fn finish(&self, divisor: usize) -> EpochMetrics {
        let n = divisor.max(1) as f64;
        EpochMetrics {
            train_loss: self.sums.total / n,
            data_loss: self.sums.data / n,
            f_loss: self.sums.physics / n,
        }
    }
}

/// エポックごとのメトリクス履歴。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}
