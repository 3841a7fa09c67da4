//! # 実験ロガー
//!
//! 学習ループは実験管理バックエンドを直接知らず、[`ExperimentLogger`] の
//! 3つの操作（実行開始・メトリクス送信・実行終了）だけを呼び出します。
//! 既定は何もしない [`NoopLogger`] です。

use crate::error::{PinoError, Result};
use crate::metrics::MetricRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// 実行開始時にロガーへ渡す情報。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub project: String,
    pub entity: String,
    pub group: String,
    pub config: serde_json::Value,
    pub tags: Vec<String>,
}

/// 実験管理バックエンドへの接続口。
pub trait ExperimentLogger {
    fn log_run_start(&mut self, info: &RunInfo) -> Result<()>;
    fn log_metrics(&mut self, epoch: usize, metrics: &MetricRecord) -> Result<()>;
    fn log_run_end(&mut self) -> Result<()>;
}

/// 何も記録しないロガー。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl ExperimentLogger for NoopLogger {
    fn log_run_start(&mut self, _info: &RunInfo) -> Result<()> {
        Ok(())
    }

    fn log_metrics(&mut self, _epoch: usize, _metrics: &MetricRecord) -> Result<()> {
        Ok(())
    }

    fn log_run_end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// `tracing` のイベントとして記録するロガー。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl ExperimentLogger for TracingLogger {
    fn log_run_start(&mut self, info: &RunInfo) -> Result<()> {
        tracing::info!(
            project = %info.project,
            entity = %info.entity,
            group = %info.group,
            tags = ?info.tags,
            "Experiment run started"
        );
        Ok(())
    }

    fn log_metrics(&mut self, epoch: usize, metrics: &MetricRecord) -> Result<()> {
        tracing::info!(epoch, ?metrics, "Epoch metrics");
        Ok(())
    }

    fn log_run_end(&mut self) -> Result<()> {
        tracing::info!("Experiment run finished");
        Ok(())
    }
}

/// JSON Lines ファイルの1行。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RunStart(RunInfo),
    Metrics { epoch: usize, metrics: MetricRecord },
    RunEnd,
}

/// 1イベント1行のJSON Linesファイルへ記録するロガー。
#[derive(Debug)]
pub struct JsonlLogger {
    writer: BufWriter<File>,
}

impl JsonlLogger {
    /// ファイルを作成（既存なら上書き）します。
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    fn write_event(&mut self, event: &LogEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        // 途中で中断されても完了したエポックは残す
        self.writer.flush()?;
        Ok(())
    }
}

impl ExperimentLogger for JsonlLogger {
    fn log_run_start(&mut self, info: &RunInfo) -> Result<()> {
        self.write_event(&LogEvent::RunStart(info.clone()))
    }

    fn log_metrics(&mut self, epoch: usize, metrics: &MetricRecord) -> Result<()> {
        self.write_event(&LogEvent::Metrics {
            epoch,
            metrics: metrics.clone(),
        })
    }

    fn log_run_end(&mut self) -> Result<()> {
        self.write_event(&LogEvent::RunEnd)
    }
}

/// JSON Lines ファイルを読み込みます。空行は無視します。
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<LogEvent>> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .map_err(|e| PinoError::logger(format!("line {}: {e}", i + 1)))?;
        events.push(event);
    }
    Ok(events)
}
