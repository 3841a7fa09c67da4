//! # 学習設定
//!
//! PINOの学習設定はYAMLのネストしたマッピングとして与えられます。
//! 読み込み時にはキーの有無を検証せず、各アクセサが最初に使われた時点で
//! 欠けているキーを [`PinoError::MissingKey`] として報告します。

use crate::error::{PinoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// 学習ルーチンの種類。
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Pde {
    /// ダルシー流（固定メッシュ、データ損失 + 物理損失）
    Darcy,
    /// バーガース方程式（データ損失 + 初期条件損失 + 物理損失）
    Burgers,
}

impl fmt::Display for Pde {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pde::Darcy => write!(f, "darcy"),
            Pde::Burgers => write!(f, "burgers"),
        }
    }
}

/// `train` セクション。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ic_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epochs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batchsize: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_lr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestones: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_gamma: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// `log` セクション。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// 学習設定全体。
///
/// `data` や `model` など学習ループが参照しないセクションも
/// そのまま保持し、実験ロガーへ渡します。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PinoConfig {
    #[serde(default)]
    pub train: TrainSection,
    #[serde(default)]
    pub log: LogSection,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

macro_rules! required {
    ($(#[$doc:meta])* $name:ident, $section:ident . $field:ident, $key:literal, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> Result<$ty> {
            self.$section
                .$field
                .clone()
                .ok_or(PinoError::MissingKey($key))
        }
    };
}

impl PinoConfig {
    /// YAML文字列から設定を読み込みます。
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// YAMLファイルから設定を読み込みます。
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    required!(
        /// データ損失の重み（`train.xy_loss`）
        xy_loss, train.xy_loss, "train.xy_loss", f64
    );
    required!(
        /// 物理残差損失の重み（`train.f_loss`）
        f_loss, train.f_loss, "train.f_loss", f64
    );
    required!(
        /// 初期条件損失の重み（`train.ic_loss`、バーガースのみ）
        ic_loss, train.ic_loss, "train.ic_loss", f64
    );
    required!(epochs, train.epochs, "train.epochs", usize);
    required!(save_name, train.save_name, "train.save_name", String);
    required!(base_lr, train.base_lr, "train.base_lr", f64);
    required!(milestones, train.milestones, "train.milestones", Vec<usize>);
    required!(
        scheduler_gamma,
        train.scheduler_gamma,
        "train.scheduler_gamma",
        f64
    );
    required!(
        /// 実験ロガーのエンティティ（ログ有効時のみ参照）
        entity, log.entity, "log.entity", String
    );

    /// チェックポイントの保存先ディレクトリ（`train.save_dir`）
    pub fn save_dir(&self) -> Result<PathBuf> {
        self.train
            .save_dir
            .as_ref()
            .map(PathBuf::from)
            .ok_or(PinoError::MissingKey("train.save_dir"))
    }

    /// 実験ロガーのプロジェクト名（`log.project`、任意）
    pub fn project(&self) -> Option<&str> {
        self.log.project.as_deref()
    }

    /// 実験ロガーのグループ名（`log.group`、任意）
    pub fn group(&self) -> Option<&str> {
        self.log.group.as_deref()
    }

    /// 設定全体をJSON値へ変換します。実験ロガーの初期化レコードに使います。
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// 指定したルーチンが必要とするキーをすべて解決し、欠けているキーを列挙します。
    ///
    /// 学習ルーチン自体は最初のアクセスで失敗しますが、`check` コマンドでは
    /// 欠けているキーを一度に報告したいので、こちらを使います。
    pub fn missing_keys(&self, pde: Pde, logging: bool) -> Vec<&'static str> {
        let mut checks: Vec<Result<()>> = vec![
            self.xy_loss().map(drop),
            self.f_loss().map(drop),
            self.epochs().map(drop),
            self.save_dir().map(drop),
            self.save_name().map(drop),
        ];
        if pde == Pde::Burgers {
            checks.push(self.ic_loss().map(drop));
        }
        if logging {
            checks.push(self.entity().map(drop));
        }
        checks
            .into_iter()
            .filter_map(|check| match check {
                Err(PinoError::MissingKey(key)) => Some(key),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DARCY: &str = r#"
data:
  name: Darcy
  n_sample: 1000
model:
  layers: [64, 64, 64, 64, 64]
train:
  batchsize: 20
  epochs: 300
  milestones: [100, 150, 200]
  base_lr: 0.001
  scheduler_gamma: 0.5
  f_loss: 1.0
  xy_loss: 5.0
  save_dir: darcy-FDM
  save_name: darcy-pretrain-pino.pt
log:
  project: PINO-Darcy-pretrain
  group: FDM
"#;

    #[test]
    fn reads_train_keys() {
        let config = PinoConfig::from_yaml_str(DARCY).unwrap();
        assert_eq!(config.xy_loss().unwrap(), 5.0);
        assert_eq!(config.f_loss().unwrap(), 1.0);
        assert_eq!(config.epochs().unwrap(), 300);
        assert_eq!(config.save_dir().unwrap(), PathBuf::from("darcy-FDM"));
        assert_eq!(config.milestones().unwrap(), vec![100, 150, 200]);
        assert!(config.other.contains_key("data"));
    }

    #[test]
    fn missing_key_fails_on_access() {
        let config = PinoConfig::from_yaml_str(DARCY).unwrap();
        match config.ic_loss() {
            Err(PinoError::MissingKey(key)) => assert_eq!(key, "train.ic_loss"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(config.entity(), Err(PinoError::MissingKey("log.entity"))));
    }

    #[test]
    fn missing_keys_depend_on_routine() {
        let config = PinoConfig::from_yaml_str(DARCY).unwrap();
        assert!(config.missing_keys(Pde::Darcy, false).is_empty());
        assert_eq!(config.missing_keys(Pde::Burgers, false), vec!["train.ic_loss"]);
        assert_eq!(
            config.missing_keys(Pde::Burgers, true),
            vec!["train.ic_loss", "log.entity"]
        );
    }

    #[test]
    fn log_names_are_optional() {
        let config = PinoConfig::from_yaml_str(DARCY).unwrap();
        assert_eq!(config.project(), Some("PINO-Darcy-pretrain"));
        assert_eq!(config.group(), Some("FDM"));
        let empty = PinoConfig::from_yaml_str("{}").unwrap();
        assert_eq!((empty.project(), empty.group()), (None, None));
    }

    #[test]
    fn empty_document_parses() {
        let config = PinoConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.missing_keys(Pde::Darcy, false).len(), 5);
    }

    #[test]
    fn json_keeps_unknown_sections() {
        let config = PinoConfig::from_yaml_str(DARCY).unwrap();
        let json = config.to_json().unwrap();
        assert_eq!(json["train"]["save_name"], "darcy-pretrain-pino.pt");
        assert_eq!(json["data"]["n_sample"], 1000);
        assert_eq!(json["log"]["project"], "PINO-Darcy-pretrain");
    }
}
