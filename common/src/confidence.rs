//! 信頼度ポリシー
//!
//! 信頼度（0.0-1.0）を表示用の段階（high/medium/low）と
//! 要確認フラグに変換する。副作用なしの純粋関数のみ。

use crate::error::{Error, Result};
use crate::types::{CardField, CardFields};
use serde::{Deserialize, Serialize};
use std::fmt;

/// high判定の下限
pub const HIGH_CONFIDENCE: f64 = 0.7;
/// medium判定の下限
pub const MEDIUM_CONFIDENCE: f64 = 0.5;
/// 要確認フラグの閾値
pub const UNCERTAINTY_THRESHOLD: f64 = 0.6;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// 信頼度の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::High => write!(f, "high"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::Low => write!(f, "low"),
        }
    }
}

/// 信頼度を段階に変換（NaNはlow）
pub fn tier_of(confidence: f64) -> ConfidenceTier {
    if confidence >= HIGH_CONFIDENCE {
        ConfidenceTier::High
    } else if confidence >= MEDIUM_CONFIDENCE {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

/// 既定閾値（0.6）未満なら要確認
pub fn is_uncertain(confidence: f64) -> bool {
    is_uncertain_with(confidence, UNCERTAINTY_THRESHOLD)
}

pub fn is_uncertain_with(confidence: f64, threshold: f64) -> bool {
    confidence < threshold
}

/// バッジ表示用のパーセント文字列（四捨五入）
pub fn format_percent(confidence: f64) -> String {
    format!("{}%", (confidence * 100.0).round() as i64)
}

/// 項目ごとの重み
///
/// 各重みは [0, 1]、合計は 1.0。コンストラクタで検証する。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "FieldWeightsRepr")]
pub struct FieldWeights {
    player_name: f64,
    year: f64,
    brand: f64,
    card_series: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldWeightsRepr {
    player_name: f64,
    year: f64,
    brand: f64,
    card_series: f64,
}

impl TryFrom<FieldWeightsRepr> for FieldWeights {
    type Error = Error;

    fn try_from(r: FieldWeightsRepr) -> Result<Self> {
        FieldWeights::new(r.player_name, r.year, r.brand, r.card_series)
    }
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl FieldWeights {
    /// 選手名0.35 / 年0.25 / ブランド0.25 / シリーズ0.15
    pub const STANDARD: FieldWeights = FieldWeights {
        player_name: 0.35,
        year: 0.25,
        brand: 0.25,
        card_series: 0.15,
    };

    pub fn new(player_name: f64, year: f64, brand: f64, card_series: f64) -> Result<Self> {
        let weights = [player_name, year, brand, card_series];
        if let Some(w) = weights.iter().find(|w| !(0.0..=1.0).contains(*w)) {
            return Err(Error::InvalidWeights(format!("重みが範囲外です: {}", w)));
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvalidWeights(format!(
                "重みの合計が1.0ではありません: {}",
                sum
            )));
        }

        Ok(Self {
            player_name,
            year,
            brand,
            card_series,
        })
    }

    pub fn weight(&self, field: CardField) -> f64 {
        match field {
            CardField::PlayerName => self.player_name,
            CardField::Year => self.year,
            CardField::Brand => self.brand,
            CardField::CardSeries => self.card_series,
        }
    }

    /// 加重和。欠けている項目は0として扱い、重みの再配分はしない
    pub fn weighted(&self, fields: &CardFields) -> f64 {
        fields
            .iter()
            .map(|(field, fc)| fc.confidence() * self.weight(field))
            .sum()
    }
}
