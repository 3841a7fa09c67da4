use crate::config::Pde;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "Training driver utilities for physics-informed neural operators (PINO)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します（check または plot）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 学習設定を読み込み、ルーチンが必要とするキーを確認します
    Check {
        /// YAML形式の学習設定ファイル
        #[arg(short, long)]
        config: PathBuf,
        /// 学習ルーチン
        #[arg(long, value_enum)]
        pde: Pde,
        /// 実験ロガーを有効にする前提で確認します（`log.entity` が必要）
        #[arg(long)]
        log: bool,
    },
    /// JSON Lines形式の実験ログから損失グラフを描画します
    Plot {
        /// `JsonlLogger` が出力したファイル
        #[arg(short, long)]
        metrics: PathBuf,
        /// 出力するPNGファイル
        #[arg(short, long, default_value = "loss_graph.png")]
        output: PathBuf,
    },
}
