//! # PINO 学習ドライバのコマンドラインツール
//!
//! ## 使い方
//!
//! ### 学習設定の確認
//! ```bash
//! cargo run --release -- check --config configs/darcy.yaml --pde darcy
//! ```
//!
//! ### 損失グラフの描画
//! ```bash
//! cargo run --release -- plot --metrics runs/darcy.jsonl --output loss_graph.png
//! ```

use clap::Parser;
use pino::cli::{Cli, Commands};
use pino::commands;
use tracing_subscriber::EnvFilter;

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、`check`または`plot`の処理に振り分けます。
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Check { config, pde, log } => commands::check(config, *pde, *log),
        Commands::Plot { metrics, output } => commands::plot(metrics, output),
    }
}
