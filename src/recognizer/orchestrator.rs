//! 2段階認識カスケード
//!
//! 1. primary を実行し、成功かつ 0.7 以上なら即採用（fallbackは呼ばない）
//! 2. fallback を実行し、成功かつ 0.5 以上なら採用
//! 3. どちらかが成功していれば信頼度の高い方（同値はprimary）
//! 4. 両方失敗なら method=failed の結果
//!
//! 項目単位の混合はせず、必ずどちらか1つの試行をそのまま返す。

use super::Recognizer;
use card_catalog_common::{RecognitionAttempt, ReconciledResult, StageMethod};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// primaryを即採用する下限
pub const PRIMARY_ACCEPT_THRESHOLD: f64 = 0.7;
/// fallbackを採用する下限
pub const FALLBACK_ACCEPT_THRESHOLD: f64 = 0.5;
/// ステージごとの既定タイムアウト
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// 1ステージの実行結果
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed(RecognitionAttempt),
    /// 認識機能がエラーを返した
    Faulted(String),
    /// タイムアウト
    TimedOut(Duration),
    Cancelled,
}

impl StageOutcome {
    /// 失敗系を失敗試行に変換。キャンセルはNone
    fn into_attempt(self, method: StageMethod) -> Option<RecognitionAttempt> {
        match self {
            StageOutcome::Completed(attempt) => Some(attempt),
            StageOutcome::Faulted(message) => Some(RecognitionAttempt::failed(
                method,
                format!("Recognition stage failed: {}", message),
            )),
            StageOutcome::TimedOut(limit) => Some(RecognitionAttempt::failed(
                method,
                format!("Recognition stage timed out after {}s", limit.as_secs_f64()),
            )),
            StageOutcome::Cancelled => None,
        }
    }
}

/// 認識オーケストレーター
///
/// 状態を持たない。注入された2つの認識機能と設定のみで結果が決まる。
#[derive(Clone)]
pub struct Orchestrator {
    primary: Arc<dyn Recognizer>,
    fallback: Arc<dyn Recognizer>,
    stage_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(primary: Arc<dyn Recognizer>, fallback: Arc<dyn Recognizer>) -> Self {
        Self {
            primary,
            fallback,
            stage_timeout: Some(DEFAULT_STAGE_TIMEOUT),
        }
    }

    /// Noneでタイムアウト無効
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// カード画像を認識して1つの結果を返す（エラーは結果に含める）
    pub async fn recognize_card(&self, image: &[u8]) -> ReconciledResult {
        self.recognize_card_with_cancel(image, &CancellationToken::new())
            .await
    }

    /// キャンセル可能な認識。キャンセル時は method=failed の結果
    pub async fn recognize_card_with_cancel(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> ReconciledResult {
        let primary = match self
            .run_stage(self.primary.as_ref(), StageMethod::Primary, image, cancel)
            .await
            .into_attempt(StageMethod::Primary)
        {
            Some(attempt) => attempt,
            None => return cancelled(),
        };

        if accepts_primary(&primary) {
            info!(
                confidence = primary.overall_confidence(),
                "primaryステージを採用"
            );
            return primary.into();
        }

        let fallback = match self
            .run_stage(self.fallback.as_ref(), StageMethod::Fallback, image, cancel)
            .await
            .into_attempt(StageMethod::Fallback)
        {
            Some(attempt) => attempt,
            None => return cancelled(),
        };

        let result = reconcile(primary, fallback);
        info!(
            method = %result.method(),
            confidence = result.overall_confidence(),
            "認識結果を確定"
        );
        result
    }

    async fn run_stage(
        &self,
        recognizer: &dyn Recognizer,
        method: StageMethod,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> StageOutcome {
        if cancel.is_cancelled() {
            return StageOutcome::Cancelled;
        }

        debug!(stage = %method, recognizer = recognizer.name(), "認識ステージ開始");

        let call = async {
            let result = match self.stage_timeout {
                Some(limit) => match tokio::time::timeout(limit, recognizer.recognize(image)).await {
                    Ok(result) => result,
                    Err(_) => return StageOutcome::TimedOut(limit),
                },
                None => recognizer.recognize(image).await,
            };
            match result {
                Ok(attempt) => StageOutcome::Completed(attempt),
                Err(e) => StageOutcome::Faulted(e.to_string()),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => StageOutcome::Cancelled,
            outcome = call => outcome,
        };

        match &outcome {
            StageOutcome::Completed(attempt) => {
                if attempt.method() != method {
                    warn!(
                        stage = %method,
                        reported = %attempt.method(),
                        "認識機能のステージ表記が呼び出し位置と異なるため付け替え"
                    );
                }
                debug!(
                    stage = %method,
                    success = attempt.success(),
                    confidence = attempt.overall_confidence(),
                    "認識ステージ完了"
                );
            }
            StageOutcome::Faulted(message) => {
                warn!(stage = %method, error = %message, "認識ステージ失敗");
            }
            StageOutcome::TimedOut(limit) => {
                warn!(stage = %method, timeout_secs = limit.as_secs_f64(), "認識ステージがタイムアウト");
            }
            StageOutcome::Cancelled => {
                debug!(stage = %method, "認識をキャンセル");
            }
        }

        match outcome {
            StageOutcome::Completed(attempt) => StageOutcome::Completed(attempt.with_method(method)),
            other => other,
        }
    }
}

fn cancelled() -> ReconciledResult {
    ReconciledResult::cancelled()
}

/// primaryを即採用できるか
pub fn accepts_primary(primary: &RecognitionAttempt) -> bool {
    primary.success() && primary.overall_confidence() >= PRIMARY_ACCEPT_THRESHOLD
}

/// primaryが基準未満だった後の最終判定
pub fn reconcile(primary: RecognitionAttempt, fallback: RecognitionAttempt) -> ReconciledResult {
    if fallback.success() && fallback.overall_confidence() >= FALLBACK_ACCEPT_THRESHOLD {
        return fallback.into();
    }

    if primary.success() || fallback.success() {
        return if primary.overall_confidence() >= fallback.overall_confidence() {
            primary.into()
        } else {
            fallback.into()
        };
    }

    ReconciledResult::insufficient_confidence()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CatalogError, Result};
    use async_trait::async_trait;
    use card_catalog_common::types::CANCELLED_MESSAGE;
    use card_catalog_common::{
        CardFields, FieldConfidence, FieldWeights, RecognitionMethod,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 総合信頼度がちょうど `confidence` になる成功試行
    ///
    /// 選手名のみ重み1.0にして浮動小数の丸めを避ける
    fn success(method: StageMethod, confidence: f64) -> RecognitionAttempt {
        let fc = |v: &str| Some(FieldConfidence::new(v, confidence).unwrap());
        let fields = CardFields {
            player_name: fc("Robin Yount"),
            year: fc("1982"),
            brand: fc("Topps"),
            card_series: fc("Heritage"),
        };
        let weights = FieldWeights::new(1.0, 0.0, 0.0, 0.0).unwrap();
        RecognitionAttempt::succeeded(method, fields, &weights)
    }

    enum Behavior {
        Return(RecognitionAttempt),
        Fail,
        Hang,
    }

    struct StubRecognizer {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl StubRecognizer {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Recognizer for StubRecognizer {
        fn name(&self) -> &str {
            "stub"
        }

        async fn recognize(&self, _image: &[u8]) -> Result<RecognitionAttempt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Return(attempt) => Ok(attempt.clone()),
                Behavior::Fail => Err(CatalogError::ApiCall("connection reset".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(CatalogError::ApiCall("unreachable".into()))
                }
            }
        }
    }

    fn orchestrator(primary: &Arc<StubRecognizer>, fallback: &Arc<StubRecognizer>) -> Orchestrator {
        Orchestrator::new(primary.clone(), fallback.clone())
    }

    #[tokio::test]
    async fn test_high_confidence_primary_short_circuits() {
        let attempt = success(StageMethod::Primary, 0.85);
        let primary = StubRecognizer::new(Behavior::Return(attempt.clone()));
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.9)));

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert_eq!(result, ReconciledResult::from(attempt));
        assert_eq!(result.method(), RecognitionMethod::Primary);
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_accepted_when_primary_below_bar() {
        let primary = StubRecognizer::new(Behavior::Return(success(StageMethod::Primary, 0.6)));
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.55)));

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert_eq!(result.method(), RecognitionMethod::Fallback);
        assert!(result.success());
        assert!((result.overall_confidence() - 0.55).abs() < 1e-9);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_low_primary_returned_when_fallback_fails() {
        let primary = StubRecognizer::new(Behavior::Return(success(StageMethod::Primary, 0.4)));
        let fallback = StubRecognizer::new(Behavior::Return(RecognitionAttempt::failed(
            StageMethod::Fallback,
            "Fallback recognition failed",
        )));

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert_eq!(result.method(), RecognitionMethod::Primary);
        assert!(result.success());
        assert!((result.overall_confidence() - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_both_failed_is_total_failure() {
        let primary = StubRecognizer::new(Behavior::Return(RecognitionAttempt::failed(
            StageMethod::Primary,
            "Primary recognition failed",
        )));
        let fallback = StubRecognizer::new(Behavior::Return(RecognitionAttempt::failed(
            StageMethod::Fallback,
            "Fallback recognition failed",
        )));

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert!(!result.success());
        assert_eq!(result.method(), RecognitionMethod::Failed);
        assert_eq!(result.overall_confidence(), 0.0);
        assert!(result.error().is_some_and(|e| !e.is_empty()));
        assert!(result.fields().is_none());
    }

    #[tokio::test]
    async fn test_faulted_primary_still_runs_fallback() {
        let primary = StubRecognizer::new(Behavior::Fail);
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.3)));

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert_eq!(fallback.calls(), 1);
        assert_eq!(result.method(), RecognitionMethod::Fallback);
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_both_faulted_is_total_failure() {
        let primary = StubRecognizer::new(Behavior::Fail);
        let fallback = StubRecognizer::new(Behavior::Fail);

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert_eq!(result.method(), RecognitionMethod::Failed);
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_tie_goes_to_primary() {
        let primary = StubRecognizer::new(Behavior::Return(success(StageMethod::Primary, 0.45)));
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.45)));

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert_eq!(result.method(), RecognitionMethod::Primary);
    }

    #[tokio::test]
    async fn test_higher_fallback_wins_below_bars() {
        let primary = StubRecognizer::new(Behavior::Return(success(StageMethod::Primary, 0.3)));
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.45)));

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert_eq!(result.method(), RecognitionMethod::Fallback);
    }

    #[tokio::test]
    async fn test_timed_out_stage_is_recovered() {
        let primary = StubRecognizer::new(Behavior::Hang);
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.6)));

        let result = orchestrator(&primary, &fallback)
            .with_stage_timeout(Some(Duration::from_millis(50)))
            .recognize_card(b"img")
            .await;

        assert_eq!(result.method(), RecognitionMethod::Fallback);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_outcome_is_distinct() {
        let primary = StubRecognizer::new(Behavior::Hang);
        let fallback = StubRecognizer::new(Behavior::Hang);
        let orchestrator = orchestrator(&primary, &fallback)
            .with_stage_timeout(Some(Duration::from_millis(20)));

        let outcome = orchestrator
            .run_stage(
                primary.as_ref(),
                StageMethod::Primary,
                b"img",
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome, StageOutcome::TimedOut(Duration::from_millis(20)));

        let attempt = outcome.into_attempt(StageMethod::Primary).unwrap();
        assert!(attempt.error().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let primary = StubRecognizer::new(Behavior::Return(success(StageMethod::Primary, 0.9)));
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.9)));
        let token = CancellationToken::new();
        token.cancel();

        let result = orchestrator(&primary, &fallback)
            .recognize_card_with_cancel(b"img", &token)
            .await;

        assert_eq!(result.method(), RecognitionMethod::Failed);
        assert_eq!(result.error(), Some(CANCELLED_MESSAGE));
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_stage() {
        let primary = StubRecognizer::new(Behavior::Hang);
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.9)));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = orchestrator(&primary, &fallback)
            .with_stage_timeout(None)
            .recognize_card_with_cancel(b"img", &token)
            .await;

        assert_eq!(result.error(), Some(CANCELLED_MESSAGE));
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_mislabelled_attempt_is_retagged() {
        // primary位置の認識機能がfallbackタグを返しても primary として扱う
        let primary = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.9)));
        let fallback = StubRecognizer::new(Behavior::Fail);

        let result = orchestrator(&primary, &fallback).recognize_card(b"img").await;

        assert_eq!(result.method(), RecognitionMethod::Primary);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_idempotent_with_deterministic_stubs() {
        let primary = StubRecognizer::new(Behavior::Return(success(StageMethod::Primary, 0.62)));
        let fallback = StubRecognizer::new(Behavior::Return(success(StageMethod::Fallback, 0.41)));
        let orchestrator = orchestrator(&primary, &fallback);

        let first = orchestrator.recognize_card(b"img").await;
        let second = orchestrator.recognize_card(b"img").await;

        assert_eq!(first, second);
        assert_eq!(first.method(), RecognitionMethod::Primary);
    }

    #[test]
    fn test_accepts_primary_boundary() {
        assert!(accepts_primary(&success(StageMethod::Primary, 0.7)));
        assert!(!accepts_primary(&success(StageMethod::Primary, 0.6999)));
        assert!(!accepts_primary(&RecognitionAttempt::failed(StageMethod::Primary, "x")));
    }

    #[test]
    fn test_reconcile_fallback_boundary() {
        let result = reconcile(
            success(StageMethod::Primary, 0.65),
            success(StageMethod::Fallback, 0.5),
        );
        assert_eq!(result.method(), RecognitionMethod::Fallback);

        let result = reconcile(
            success(StageMethod::Primary, 0.65),
            success(StageMethod::Fallback, 0.4999),
        );
        assert_eq!(result.method(), RecognitionMethod::Primary);
    }
}
