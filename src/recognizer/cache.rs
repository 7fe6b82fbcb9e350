//! 認識結果キャッシュモジュール
//!
//! 画像バイト列のSHA-256をキーにして認識結果をキャッシュし、
//! 同じ画像の再認識をスキップする。成功した結果のみ保存する。
//! 認識設定（プロバイダ・重みなど）の指紋が異なるキャッシュは使わない。

use super::Orchestrator;
use crate::config::Config;
use crate::error::Result;
use card_catalog_common::ReconciledResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const CACHE_FILE_NAME: &str = ".recognition-cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionCache {
    /// バージョン（互換性チェック用）
    version: u32,
    /// 結果を作ったときの認識設定の指紋
    #[serde(default)]
    fingerprint: String,
    /// 画像ハッシュ → 認識結果
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub file_name: String,
    pub file_size: u64,
    pub result: ReconciledResult,
}

impl RecognitionCache {
    const CURRENT_VERSION: u32 = 1;

    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            ..Self::default()
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn cache_path(folder: &Path) -> PathBuf {
        folder.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み。無い・壊れている・バージョン違いは空
    pub fn load(folder: &Path) -> Self {
        let cache_path = Self::cache_path(folder);
        if !cache_path.exists() {
            return Self::default();
        }

        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        match serde_json::from_reader::<_, RecognitionCache>(BufReader::new(file)) {
            Ok(cache) if cache.version == Self::CURRENT_VERSION => cache,
            Ok(cache) => {
                warn!(found = cache.version, "キャッシュバージョン不一致、再生成します");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "キャッシュファイルが破損しているため無視します");
                Self::default()
            }
        }
    }

    /// 指紋が一致するキャッシュのみ読み込む。不一致なら空
    pub fn load_matching(folder: &Path, fingerprint: &str) -> Self {
        let cache = Self::load(folder);
        if cache.fingerprint == fingerprint {
            return cache;
        }
        if !cache.is_empty() {
            warn!(entries = cache.len(), "認識設定が変わったためキャッシュを使いません");
        }
        Self::new(fingerprint)
    }

    pub fn save(&self, folder: &Path) -> Result<()> {
        let file = File::create(Self::cache_path(folder))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn get(&self, hash: &str) -> Option<&ReconciledResult> {
        self.entries.get(hash).map(|e| &e.result)
    }

    pub fn entry(&self, hash: &str) -> Option<&CacheEntry> {
        self.entries.get(hash)
    }

    /// 成功した結果のみ追加する。追加したかを返す
    pub fn insert(
        &mut self,
        hash: String,
        file_name: String,
        file_size: u64,
        result: ReconciledResult,
    ) -> bool {
        if !result.success() {
            return false;
        }
        self.entries.insert(
            hash,
            CacheEntry {
                file_name,
                file_size,
                result,
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// メモリ上のエントリとキャッシュファイルを削除
    pub fn clear(&mut self, folder: &Path) -> Result<()> {
        self.entries.clear();
        let path = Self::cache_path(folder);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl Default for RecognitionCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            fingerprint: String::new(),
            entries: HashMap::new(),
        }
    }
}

/// 画像バイト列のハッシュ（SHA-256, 16進）
pub fn compute_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// 認識結果に影響する設定の指紋
pub fn settings_fingerprint(config: &Config) -> String {
    let settings = serde_json::json!({
        "primaryProvider": config.primary_provider,
        "fallbackProvider": config.fallback_provider,
        "geminiModel": config.gemini_model,
        "weights": config.weights(),
        "aliasPreset": config.alias_preset,
        "maxImageSize": config.max_image_size,
    });
    compute_hash(settings.to_string().as_bytes())
}

/// キャッシュを使って認識する
///
/// ヒットすればオーケストレーターを呼ばない。成功した新しい結果はキャッシュに追加する
/// （保存は呼び出し側で行う）。
pub async fn recognize_with_cache(
    orchestrator: &Orchestrator,
    cache: &mut RecognitionCache,
    file_name: &str,
    image: &[u8],
    cancel: &CancellationToken,
) -> ReconciledResult {
    let hash = compute_hash(image);
    if let Some(result) = cache.get(&hash) {
        debug!(file_name, "キャッシュヒット");
        return result.clone();
    }

    let result = orchestrator.recognize_card_with_cancel(image, cancel).await;
    cache.insert(hash, file_name.to_string(), image.len() as u64, result.clone());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_catalog_common::FieldWeights;

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            compute_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(compute_hash(b"a"), compute_hash(b"b"));
    }

    #[test]
    fn test_fingerprint_follows_settings() {
        let config = Config::default();
        assert_eq!(settings_fingerprint(&config), settings_fingerprint(&Config::default()));

        let reweighted = Config {
            field_weights: Some(FieldWeights::new(0.4, 0.2, 0.2, 0.2).unwrap()),
            ..Config::default()
        };
        assert_ne!(settings_fingerprint(&config), settings_fingerprint(&reweighted));

        let other_provider = Config {
            fallback_provider: crate::ai_provider::AiProvider::Codex,
            ..Config::default()
        };
        assert_ne!(settings_fingerprint(&config), settings_fingerprint(&other_provider));
    }

    #[test]
    fn test_failed_result_not_cached() {
        let mut cache = RecognitionCache::default();
        let inserted = cache.insert(
            "h".into(),
            "x.jpg".into(),
            1,
            ReconciledResult::insufficient_confidence(),
        );
        assert!(!inserted);
        assert!(cache.is_empty());
    }
}
