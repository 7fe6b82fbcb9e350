//! キャッシュ機能テスト
//!
//! 認識結果キャッシュの動作を検証

use async_trait::async_trait;
use card_catalog::error::Result;
use card_catalog::recognizer::cache::{
    compute_hash, recognize_with_cache, settings_fingerprint, RecognitionCache, CACHE_FILE_NAME,
};
use card_catalog::config::Config;
use card_catalog::recognizer::{Orchestrator, Recognizer};
use card_catalog_common::{
    CardFields, FieldConfidence, FieldWeights, RecognitionAttempt, RecognitionMethod,
    ReconciledResult, StageMethod,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn recognized(player: &str, confidence: f64) -> ReconciledResult {
    let fields = CardFields {
        player_name: Some(FieldConfidence::new(player, confidence).unwrap()),
        year: Some(FieldConfidence::new("1982", confidence).unwrap()),
        brand: Some(FieldConfidence::new("Topps", confidence).unwrap()),
        card_series: Some(FieldConfidence::new("Traded", confidence).unwrap()),
    };
    RecognitionAttempt::succeeded(StageMethod::Primary, fields, &FieldWeights::STANDARD).into()
}

/// 呼び出し回数を数える認識機能
struct CountingRecognizer {
    attempt: RecognitionAttempt,
    calls: AtomicUsize,
}

#[async_trait]
impl Recognizer for CountingRecognizer {
    fn name(&self) -> &str {
        "counting"
    }

    async fn recognize(&self, _image: &[u8]) -> Result<RecognitionAttempt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.attempt.clone())
    }
}

fn counting(attempt: RecognitionAttempt) -> Arc<CountingRecognizer> {
    Arc::new(CountingRecognizer {
        attempt,
        calls: AtomicUsize::new(0),
    })
}

/// 空のキャッシュファイル
#[test]
fn test_cache_file_empty() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cache = RecognitionCache::load(dir.path());

    assert_eq!(cache.len(), 0);
    assert!(cache.is_empty());
}

/// キャッシュの保存と読み込み
#[test]
fn test_cache_save_and_load() {
    let dir = tempdir().expect("Failed to create temp dir");

    let mut cache = RecognitionCache::load(dir.path());
    let result = recognized("Robin Yount", 0.9);
    assert!(cache.insert("abc123".into(), "yount.jpg".into(), 1024, result.clone()));
    cache.save(dir.path()).expect("キャッシュ保存失敗");

    let loaded = RecognitionCache::load(dir.path());
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.get("abc123"), Some(&result));
    let entry = loaded.entry("abc123").expect("エントリが見つからない");
    assert_eq!(entry.file_name, "yount.jpg");
    assert_eq!(entry.file_size, 1024);
}

/// キャッシュの上書き
#[test]
fn test_cache_overwrite() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut cache = RecognitionCache::load(dir.path());

    cache.insert("same".into(), "a.jpg".into(), 10, recognized("Paul Molitor", 0.6));
    cache.insert("same".into(), "a.jpg".into(), 10, recognized("Paul Molitor", 0.9));

    assert_eq!(cache.len(), 1);
    let cached = cache.get("same").expect("キャッシュが見つからない");
    assert!((cached.overall_confidence() - 0.9).abs() < 1e-9);
}

/// キャッシュファイルが破損している場合
#[test]
fn test_cache_corrupted_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join(CACHE_FILE_NAME), "{ invalid json }").unwrap();

    let cache = RecognitionCache::load(dir.path());
    assert!(cache.is_empty());
}

/// バージョン違いは空として扱う
#[test]
fn test_cache_version_mismatch() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(
        dir.path().join(CACHE_FILE_NAME),
        r#"{"version": 99, "entries": {}}"#,
    )
    .unwrap();

    assert!(RecognitionCache::load(dir.path()).is_empty());
}

/// 認識設定が変わると以前の結果を使わない
#[test]
fn test_cache_ignored_after_settings_change() {
    let dir = tempdir().expect("Failed to create temp dir");
    let standard = settings_fingerprint(&Config::default());

    let mut cache = RecognitionCache::new(standard.clone());
    cache.insert("h".into(), "x.jpg".into(), 1, recognized("Gorman Thomas", 0.8));
    cache.save(dir.path()).unwrap();

    let same = RecognitionCache::load_matching(dir.path(), &standard);
    assert_eq!(same.len(), 1);

    let reweighted = Config {
        field_weights: Some(FieldWeights::new(0.55, 0.15, 0.15, 0.15).unwrap()),
        ..Config::default()
    };
    let changed = settings_fingerprint(&reweighted);
    let other = RecognitionCache::load_matching(dir.path(), &changed);
    assert!(other.is_empty());
    assert_eq!(other.fingerprint(), changed);
}

/// clearでファイルも削除される
#[test]
fn test_cache_clear_removes_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut cache = RecognitionCache::load(dir.path());
    cache.insert("h".into(), "x.jpg".into(), 1, recognized("Cecil Cooper", 0.8));
    cache.save(dir.path()).unwrap();
    assert!(RecognitionCache::cache_path(dir.path()).exists());

    cache.clear(dir.path()).unwrap();
    assert!(cache.is_empty());
    assert!(!RecognitionCache::cache_path(dir.path()).exists());
}

/// ヒット時は認識機能を呼ばない
#[tokio::test]
async fn test_recognize_with_cache_skips_second_call() {
    let attempt: RecognitionAttempt = {
        let fields = CardFields {
            player_name: Some(FieldConfidence::new("Gorman Thomas", 0.9).unwrap()),
            year: Some(FieldConfidence::new("1980", 0.9).unwrap()),
            brand: Some(FieldConfidence::new("Topps", 0.9).unwrap()),
            card_series: Some(FieldConfidence::new("Base", 0.9).unwrap()),
        };
        RecognitionAttempt::succeeded(StageMethod::Primary, fields, &FieldWeights::STANDARD)
    };
    let primary = counting(attempt);
    let fallback = counting(RecognitionAttempt::failed(StageMethod::Fallback, "unused"));
    let orchestrator = Orchestrator::new(primary.clone(), fallback.clone());
    let mut cache = RecognitionCache::default();
    let cancel = CancellationToken::new();

    let first = recognize_with_cache(&orchestrator, &mut cache, "a.jpg", b"image", &cancel).await;
    let second = recognize_with_cache(&orchestrator, &mut cache, "a.jpg", b"image", &cancel).await;

    assert_eq!(first, second);
    assert_eq!(first.method(), RecognitionMethod::Primary);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&compute_hash(b"image")).is_some());
}

/// 失敗結果はキャッシュされず、次回も認識し直す
#[tokio::test]
async fn test_failed_recognition_not_cached() {
    let primary = counting(RecognitionAttempt::failed(StageMethod::Primary, "blurry"));
    let fallback = counting(RecognitionAttempt::failed(StageMethod::Fallback, "blurry"));
    let orchestrator = Orchestrator::new(primary.clone(), fallback.clone());
    let mut cache = RecognitionCache::default();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let result =
            recognize_with_cache(&orchestrator, &mut cache, "b.jpg", b"blurry", &cancel).await;
        assert!(result.is_failed());
    }

    assert!(cache.is_empty());
    assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
}
