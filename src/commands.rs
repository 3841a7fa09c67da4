use crate::config::{Pde, PinoConfig};
use crate::logger::read_jsonl;
use crate::plot::{plot_loss_history, series_from_events};
use crate::training::RunOptions;
use std::path::Path;

/// `check`サブコマンドを実行します。
pub fn check(config_path: &Path, pde: Pde, log: bool) -> anyhow::Result<()> {
    let config = PinoConfig::from_yaml_file(config_path)?;
    let missing = config.missing_keys(pde, log);
    if !missing.is_empty() {
        anyhow::bail!(
            "'{}' に {} ルーチンで必要なキーがありません: {}",
            config_path.display(),
            pde,
            missing.join(", ")
        );
    }

    println!("設定ファイル '{}' ({})", config_path.display(), pde);
    println!("=> エポック数: {}", config.epochs()?);
    print!("=> 損失の重み: xy_loss={}, f_loss={}", config.xy_loss()?, config.f_loss()?);
    if pde == Pde::Burgers {
        print!(", ic_loss={}", config.ic_loss()?);
    }
    println!();
    println!(
        "=> チェックポイント: {}",
        config.save_dir()?.join(config.save_name()?).display()
    );
    if log {
        let options = RunOptions::new().with_log_section(&config);
        println!(
            "=> 実験ロガー: {}/{} (group={})",
            config.entity()?,
            options.project,
            options.group
        );
    }
    if let (Ok(lr), Ok(milestones)) = (config.base_lr(), config.milestones()) {
        println!(
            "=> 学習率: {lr} (milestones={milestones:?}, gamma={})",
            config.scheduler_gamma().unwrap_or(0.5)
        );
    }
    Ok(())
}

/// `plot`サブコマンドを実行します。
pub fn plot(metrics_path: &Path, output: &Path) -> anyhow::Result<()> {
    let events = read_jsonl(metrics_path)?;
    let series = series_from_events(&events);
    if series.is_empty() {
        anyhow::bail!("'{}' にメトリクスが記録されていません", metrics_path.display());
    }
    plot_loss_history(&series, output).map_err(|e| anyhow::anyhow!("グラフの描画に失敗しました: {e}"))?;
    println!("=> 損失グラフを '{}' に保存しました。", output.display());
    Ok(())
}
