//! エイリアス変換モジュール
//!
//! 認識されたブランド名・シリーズ名の表記ゆれを正規化する。
//! 信頼度には触れず、値だけを置き換える。

use crate::error::Result;
use crate::types::{CardField, RecognitionAttempt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// エイリアス定義
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasConfig {
    /// ブランドのエイリアス
    #[serde(default)]
    pub brand: HashMap<String, String>,
    /// シリーズのエイリアス
    #[serde(default)]
    pub card_series: HashMap<String, String>,
}

impl AliasConfig {
    /// 組み込みプリセットを取得
    pub fn from_preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "standard" | "標準" => Some(Self::standard_preset()),
            _ => None,
        }
    }

    /// JSONファイルから読み込み
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// JSON文字列から読み込み
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// 標準プリセット
    fn standard_preset() -> Self {
        let mut config = Self::default();

        // ブランド
        config.brand.insert("UD".into(), "Upper Deck".into());
        config.brand.insert("Upper Deck".into(), "Upper Deck".into());
        config.brand.insert("Topps".into(), "Topps".into());
        config.brand.insert("Bowman".into(), "Bowman".into());
        config.brand.insert("Panini".into(), "Panini".into());
        config.brand.insert("Donruss".into(), "Donruss".into());
        config.brand.insert("Fleer".into(), "Fleer".into());
        config.brand.insert("Leaf".into(), "Leaf".into());

        // シリーズ
        config.card_series.insert("SC".into(), "Stadium Club".into());
        config.card_series.insert("Stadium".into(), "Stadium Club".into());
        config.card_series.insert("Chrome".into(), "Chrome".into());
        config.card_series.insert("Heritage".into(), "Heritage".into());
        config.card_series.insert("Finest".into(), "Finest".into());
        config.card_series.insert("Prizm".into(), "Prizm".into());

        config
    }

    /// フィールドを変換（大文字小文字無視の完全一致 → 単語境界での部分一致の最長マッチ）
    fn transform_field(&self, value: &str, aliases: &HashMap<String, String>) -> String {
        if value.is_empty() {
            return value.to_string();
        }

        // 完全一致を優先
        if let Some(replacement) = aliases
            .iter()
            .find(|(pattern, _)| pattern.eq_ignore_ascii_case(value.trim()))
            .map(|(_, r)| r)
        {
            return replacement.clone();
        }

        // 部分一致（最長マッチ）
        let mut best_match: Option<(&str, &str)> = None;
        for (pattern, replacement) in aliases {
            if contains_word(value, pattern)
                && best_match.map_or(true, |(best, _)| pattern.len() > best.len())
            {
                best_match = Some((pattern.as_str(), replacement.as_str()));
            }
        }

        match best_match {
            Some((_, replacement)) => replacement.to_string(),
            None => value.to_string(),
        }
    }

    /// 試行結果にエイリアス変換を適用
    pub fn apply(&self, attempt: &RecognitionAttempt) -> RecognitionAttempt {
        attempt.map_values(|field, value| match field {
            CardField::Brand => self.transform_field(value, &self.brand),
            CardField::CardSeries => self.transform_field(value, &self.card_series),
            _ => value.to_string(),
        })
    }

    /// 設定をマージ（後から追加した設定が優先）
    pub fn merge(&mut self, other: &AliasConfig) {
        self.brand.extend(other.brand.clone());
        self.card_series.extend(other.card_series.clone());
    }

    pub fn is_empty(&self) -> bool {
        self.brand.is_empty() && self.card_series.is_empty()
    }
}

/// 単語境界を考慮した大文字小文字無視の包含判定
fn contains_word(value: &str, pattern: &str) -> bool {
    let value = value.to_lowercase();
    let pattern = pattern.to_lowercase();
    if pattern.is_empty() {
        return false;
    }

    value.match_indices(&pattern).any(|(start, m)| {
        let before_ok = value[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = value[start + m.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// プリセットとカスタム定義からエイリアス設定を構築
pub fn build_aliases(preset: Option<&str>, alias_json: Option<&str>) -> Result<AliasConfig> {
    let mut config = AliasConfig::default();

    // プリセットを適用
    if let Some(preset_name) = preset {
        if let Some(preset_config) = AliasConfig::from_preset(preset_name) {
            config.merge(&preset_config);
        } else {
            eprintln!("警告: 不明なプリセット '{}' (standard)", preset_name);
        }
    }

    // カスタムエイリアスJSONを適用（プリセットを上書き）
    if let Some(json) = alias_json {
        let custom_config = AliasConfig::from_json(json)?;
        config.merge(&custom_config);
    }

    Ok(config)
}
