//! # チェックポイント
//!
//! モデルとオプティマイザの状態を `save_dir/save_name/` に保存します。
//! ディレクトリの中身は `model.mpk`・`optimizer.mpk`・`meta.json` です。

use crate::error::Result;
use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MODEL_FILE: &str = "model";
const OPTIMIZER_FILE: &str = "optimizer";
const META_FILE: &str = "meta.json";

/// チェックポイントと一緒に保存するメタデータ。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub name: String,
    /// 保存時点までに完了したエポック数
    pub epochs_completed: usize,
}

/// 途中経過スナップショットのファイル名。`.pt` を `_{epoch}.pt` に置き換えます。
pub fn snapshot_name(save_name: &str, epoch: usize) -> String {
    save_name.replace(".pt", &format!("_{epoch}.pt"))
}

/// チェックポイントの書き出し先。
pub trait CheckpointWriter {
    /// `dir/name` にモデルとオプティマイザの状態を保存し、保存先のパスを返します。
    fn write<B, M, O>(
        &mut self,
        dir: &Path,
        name: &str,
        epochs_completed: usize,
        model: &M,
        optimizer: &O,
    ) -> Result<PathBuf>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>;
}

/// burn の `NamedMpkFileRecorder`（全精度）で保存する既定の実装。
#[derive(Clone, Copy, Debug, Default)]
pub struct MpkCheckpointer;

impl CheckpointWriter for MpkCheckpointer {
    fn write<B, M, O>(
        &mut self,
        dir: &Path,
        name: &str,
        epochs_completed: usize,
        model: &M,
        optimizer: &O,
    ) -> Result<PathBuf>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let path = dir.join(name);
        std::fs::create_dir_all(&path)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        model.clone().save_file(path.join(MODEL_FILE), &recorder)?;
        recorder.record(optimizer.to_record(), path.join(OPTIMIZER_FILE))?;
        serde_json::to_writer_pretty(
            std::fs::File::create(path.join(META_FILE))?,
            &CheckpointMeta {
                name: name.to_string(),
                epochs_completed,
            },
        )?;

        tracing::info!(path = %path.display(), epochs_completed, "Checkpoint saved");
        Ok(path)
    }
}

/// 保存済みのチェックポイントからモデルとオプティマイザの状態を復元します。
///
/// `model` と `optimizer` は保存時と同じ構成で初期化したものを渡してください。
pub fn load_checkpoint<B, M, O>(
    path: &Path,
    model: M,
    optimizer: O,
    device: &B::Device,
) -> Result<(M, O, CheckpointMeta)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = model.load_file(path.join(MODEL_FILE), &recorder, device)?;
    let record = recorder.load(path.join(OPTIMIZER_FILE), device)?;
    let optimizer = optimizer.load_record(record);
    let meta = serde_json::from_reader(std::fs::File::open(path.join(META_FILE))?)?;
    Ok((model, optimizer, meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_inserts_epoch() {
        assert_eq!(snapshot_name("burgers-pino.pt", 100), "burgers-pino_100.pt");
        assert_eq!(snapshot_name("burgers-pino.pt", 0), "burgers-pino_0.pt");
    }

    #[test]
    fn snapshot_without_extension_is_unchanged() {
        assert_eq!(snapshot_name("burgers", 200), "burgers");
    }
}
