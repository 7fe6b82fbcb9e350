//! カード画像認識
//!
//! - Recognizer: 1ステージ分の認識機能
//! - Orchestrator: primary → fallback の2段階カスケード
//! - VisionRecognizer: AI CLI / Gemini API を使った実装

pub mod cache;
mod cli_backend;
mod gemini;
pub mod image_prep;
pub mod orchestrator;
mod vision;

pub use orchestrator::{Orchestrator, StageOutcome};
pub use vision::{VisionBackend, VisionRecognizer};

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use card_catalog_common::{RecognitionAttempt, StageMethod};
use std::sync::Arc;

/// 認識ステージ
///
/// `Err` は通信・処理の失敗。Orchestrator はそのステージを失敗として扱い、
/// カスケードを継続する。
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// ログ用の識別名
    fn name(&self) -> &str;

    async fn recognize(&self, image: &[u8]) -> Result<RecognitionAttempt>;
}

/// 設定から primary / fallback を組み立てる
///
/// `stage_timeout_seconds` が 0 ならタイムアウトなし
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let primary = VisionRecognizer::from_config(StageMethod::Primary, config)?;
    let fallback = VisionRecognizer::from_config(StageMethod::Fallback, config)?;
    let timeout = (config.stage_timeout_seconds > 0).then(|| config.stage_timeout());

    Ok(Orchestrator::new(Arc::new(primary), Arc::new(fallback)).with_stage_timeout(timeout))
}
