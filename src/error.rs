//! 学習ドライバ全体で使うエラー型。

use thiserror::Error;

/// PINO学習ドライバのエラー。
///
/// どのエラーも実行を即座に中断させます。リトライや部分的な復旧は行いません。
#[derive(Error, Debug)]
pub enum PinoError {
    /// 設定ファイルに必要なキーが存在しない
    #[error("missing configuration key `{0}`")]
    MissingKey(&'static str),

    /// テンソル形状の不整合（クロップ、リシェイプ、モリファイアのブロードキャスト）
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// メッシュを提供しないデータソースでモリファイアが要求された
    #[error("data source does not provide a {0}")]
    MissingMesh(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// チェックポイントの保存・読み込みの失敗
    #[error("checkpoint recorder error: {0}")]
    Recorder(#[from] burn::record::RecorderError),

    /// 実験ロガーの失敗
    #[error("experiment logger error: {0}")]
    Logger(String),
}

impl PinoError {
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn logger(msg: impl Into<String>) -> Self {
        Self::Logger(msg.into())
    }
}

/// このクレートの`Result`型。
pub type Result<T> = std::result::Result<T, PinoError>;
