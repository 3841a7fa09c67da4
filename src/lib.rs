//! # 物理情報ニューラル作用素 (PINO) 学習ドライバ
//!
//! `burn` フレームワークの上で、2次元PDE（ダルシー流・バーガース方程式）を解く
//! 物理情報ニューラル作用素の学習ループを提供します。
//!
//! ネットワーク本体と PDE 残差の計算式は [`model::NeuralOperator`]・
//! [`loss::DarcyResidual`]・[`loss::BurgersResidual`] を実装して外から渡します。
//! このクレートはエポックとバッチの管理、損失の重み付け、オプティマイザと
//! スケジューラの更新、チェックポイントの保存、実験ログの記録を受け持ちます。

pub mod checkpoint;
pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod logger;
pub mod loss;
pub mod mesh;
pub mod metrics;
pub mod model;
pub mod plot;
pub mod scheduler;
pub mod training;

pub use error::{PinoError, Result};
pub use training::{RunOptions, TrainOutcome, Trainer};
