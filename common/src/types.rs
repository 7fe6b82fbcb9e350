//! 認識結果の型定義
//!
//! CLIとライブラリで共有される型:
//! - FieldConfidence / CardFields: 項目ごとの認識値と信頼度
//! - RecognitionAttempt: 1ステージ（primary / fallback）の出力
//! - ReconciledResult: 最終出力（どちらか1つの試行をそのまま採用）

use crate::confidence::FieldWeights;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 認識項目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardField {
    PlayerName,
    Year,
    Brand,
    CardSeries,
}

impl CardField {
    pub const ALL: [CardField; 4] = [
        CardField::PlayerName,
        CardField::Year,
        CardField::Brand,
        CardField::CardSeries,
    ];

    /// JSONキー名
    pub fn key(&self) -> &'static str {
        match self {
            CardField::PlayerName => "playerName",
            CardField::Year => "year",
            CardField::Brand => "brand",
            CardField::CardSeries => "cardSeries",
        }
    }
}

impl fmt::Display for CardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardField::PlayerName => write!(f, "選手名"),
            CardField::Year => write!(f, "年"),
            CardField::Brand => write!(f, "ブランド"),
            CardField::CardSeries => write!(f, "シリーズ"),
        }
    }
}

/// 認識値と信頼度（0.0-1.0）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldConfidenceRepr")]
pub struct FieldConfidence {
    value: String,
    confidence: f64,
}

#[derive(Deserialize)]
struct FieldConfidenceRepr {
    value: String,
    confidence: f64,
}

impl TryFrom<FieldConfidenceRepr> for FieldConfidence {
    type Error = Error;

    fn try_from(repr: FieldConfidenceRepr) -> Result<Self> {
        FieldConfidence::new(repr.value, repr.confidence)
    }
}

impl FieldConfidence {
    /// 信頼度が [0, 1] の範囲外（NaN含む）ならエラー
    pub fn new(value: impl Into<String>, confidence: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidConfidence(confidence));
        }
        Ok(Self {
            value: value.into(),
            confidence,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// 値だけ差し替え（エイリアス変換用、信頼度は維持）
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            confidence: self.confidence,
        }
    }
}

/// 認識された4項目。Noneはその項目が得られなかったことを表す
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<FieldConfidence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<FieldConfidence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<FieldConfidence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_series: Option<FieldConfidence>,
}

impl CardFields {
    pub fn get(&self, field: CardField) -> Option<&FieldConfidence> {
        match field {
            CardField::PlayerName => self.player_name.as_ref(),
            CardField::Year => self.year.as_ref(),
            CardField::Brand => self.brand.as_ref(),
            CardField::CardSeries => self.card_series.as_ref(),
        }
    }

    pub fn set(&mut self, field: CardField, value: Option<FieldConfidence>) {
        match field {
            CardField::PlayerName => self.player_name = value,
            CardField::Year => self.year = value,
            CardField::Brand => self.brand = value,
            CardField::CardSeries => self.card_series = value,
        }
    }

    /// 存在する項目を固定順で列挙
    pub fn iter(&self) -> impl Iterator<Item = (CardField, &FieldConfidence)> {
        CardField::ALL
            .into_iter()
            .filter_map(move |field| self.get(field).map(|fc| (field, fc)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// 認識ステージ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageMethod {
    Primary,
    Fallback,
}

impl fmt::Display for StageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageMethod::Primary => write!(f, "primary"),
            StageMethod::Fallback => write!(f, "fallback"),
        }
    }
}

/// 最終結果の認識方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMethod {
    Primary,
    Fallback,
    Failed,
}

impl From<StageMethod> for RecognitionMethod {
    fn from(method: StageMethod) -> Self {
        match method {
            StageMethod::Primary => RecognitionMethod::Primary,
            StageMethod::Fallback => RecognitionMethod::Fallback,
        }
    }
}

impl fmt::Display for RecognitionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionMethod::Primary => write!(f, "primary"),
            RecognitionMethod::Fallback => write!(f, "fallback"),
            RecognitionMethod::Failed => write!(f, "failed"),
        }
    }
}

/// 1ステージの認識試行
///
/// 生成後は不変。成功時の `overall_confidence` は常に項目信頼度の加重和で、
/// 外部から直接指定できない。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionAttempt {
    method: StageMethod,
    success: bool,
    overall_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<CardFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RecognitionAttempt {
    /// 成功した試行。項目が1つも無い場合は失敗扱い
    pub fn succeeded(method: StageMethod, fields: CardFields, weights: &FieldWeights) -> Self {
        if fields.is_empty() {
            return Self::failed(method, "No card fields recognized");
        }
        Self {
            method,
            success: true,
            overall_confidence: weights.weighted(&fields),
            fields: Some(fields),
            error: None,
        }
    }

    pub fn failed(method: StageMethod, error: impl Into<String>) -> Self {
        Self {
            method,
            success: false,
            overall_confidence: 0.0,
            fields: None,
            error: Some(error.into()),
        }
    }

    pub fn method(&self) -> StageMethod {
        self.method
    }

    /// ステージのタグだけ付け替える
    pub fn with_method(self, method: StageMethod) -> Self {
        Self { method, ..self }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn overall_confidence(&self) -> f64 {
        self.overall_confidence
    }

    pub fn fields(&self) -> Option<&CardFields> {
        self.fields.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 項目値のみ変換した試行を返す（信頼度・加重和は不変）
    pub fn map_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(CardField, &str) -> String,
    {
        let fields = self.fields.as_ref().map(|fields| {
            let mut mapped = CardFields::default();
            for (field, fc) in fields.iter() {
                mapped.set(field, Some(fc.with_value(f(field, fc.value()))));
            }
            mapped
        });
        Self {
            fields,
            ..self.clone()
        }
    }
}

/// 呼び出し側へ返す最終結果
///
/// 1つの試行をそのまま包むか、全体失敗のどちらか。ステージ間の項目を
/// 混ぜた結果は作れない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledResult {
    success: bool,
    overall_confidence: f64,
    method: RecognitionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<CardFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub const INSUFFICIENT_CONFIDENCE_MESSAGE: &str =
    "Unable to recognize card with sufficient confidence";
pub const CANCELLED_MESSAGE: &str = "Recognition cancelled";

impl ReconciledResult {
    /// 全ステージ失敗
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            overall_confidence: 0.0,
            method: RecognitionMethod::Failed,
            fields: None,
            error: Some(error.into()),
        }
    }

    pub fn insufficient_confidence() -> Self {
        Self::failed(INSUFFICIENT_CONFIDENCE_MESSAGE)
    }

    pub fn cancelled() -> Self {
        Self::failed(CANCELLED_MESSAGE)
    }

    pub fn is_failed(&self) -> bool {
        self.method == RecognitionMethod::Failed
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn overall_confidence(&self) -> f64 {
        self.overall_confidence
    }

    pub fn method(&self) -> RecognitionMethod {
        self.method
    }

    pub fn fields(&self) -> Option<&CardFields> {
        self.fields.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl From<RecognitionAttempt> for ReconciledResult {
    fn from(attempt: RecognitionAttempt) -> Self {
        Self {
            success: attempt.success,
            overall_confidence: attempt.overall_confidence,
            method: attempt.method.into(),
            fields: attempt.fields,
            error: attempt.error,
        }
    }
}
