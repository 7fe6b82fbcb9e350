//! 認識結果の確認用サマリ
//!
//! ReconciledResult を段階・要確認フラグ付きの表示用データに変換する。

use crate::confidence::{is_uncertain, tier_of, ConfidenceTier};
use crate::types::{CardField, ReconciledResult};
use serde::Serialize;
use std::fmt;

/// ユーザーへの案内レベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewNotice {
    /// 高信頼度。内容を確認して保存
    HighConfidence,
    /// 中信頼度。要確認項目をチェック
    VerifyUncertainFields,
    /// 低信頼度。全項目を確認
    ReviewAllFields,
    /// 認識失敗。手入力が必要
    ManualEntryRequired,
}

impl fmt::Display for ReviewNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewNotice::HighConfidence => {
                write!(f, "高信頼度で認識しました。内容を確認してください")
            }
            ReviewNotice::VerifyUncertainFields => {
                write!(f, "中信頼度で認識しました。要確認の項目をチェックしてください")
            }
            ReviewNotice::ReviewAllFields => {
                write!(f, "低信頼度の認識です。保存前に全項目を確認してください")
            }
            ReviewNotice::ManualEntryRequired => {
                write!(f, "認識できませんでした。手入力してください")
            }
        }
    }
}

/// 項目ごとの確認情報
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReview {
    pub field: &'static str,
    pub value: String,
    pub confidence: f64,
    pub tier: ConfidenceTier,
    pub uncertain: bool,
}

/// 認識結果の確認サマリ
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionReview {
    pub tier: Option<ConfidenceTier>,
    pub notice: ReviewNotice,
    pub fields: Vec<FieldReview>,
}

impl RecognitionReview {
    pub fn uncertain_fields(&self) -> impl Iterator<Item = &FieldReview> {
        self.fields.iter().filter(|f| f.uncertain)
    }
}

impl ReconciledResult {
    pub fn review(&self) -> RecognitionReview {
        if !self.success() {
            return RecognitionReview {
                tier: None,
                notice: ReviewNotice::ManualEntryRequired,
                fields: Vec::new(),
            };
        }

        let tier = tier_of(self.overall_confidence());
        let notice = match tier {
            ConfidenceTier::High => ReviewNotice::HighConfidence,
            ConfidenceTier::Medium => ReviewNotice::VerifyUncertainFields,
            ConfidenceTier::Low => ReviewNotice::ReviewAllFields,
        };

        let fields = self
            .fields()
            .into_iter()
            .flat_map(|fields| fields.iter())
            .map(|(field, fc): (CardField, _)| FieldReview {
                field: field.key(),
                value: fc.value().to_string(),
                confidence: fc.confidence(),
                tier: tier_of(fc.confidence()),
                uncertain: is_uncertain(fc.confidence()),
            })
            .collect();

        RecognitionReview {
            tier: Some(tier),
            notice,
            fields,
        }
    }
}
