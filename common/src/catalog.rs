//! カタログの型定義と検索ロジック
//!
//! ストア実装に依存しない純粋な処理:
//! - CardMetadata / CardDraft: カードレコード
//! - CardFilters: 絞り込み条件（AND結合）
//! - search: 絞り込み・検索語・ページング
//! - CardDraft::validate: 入力検証

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CardId = String;

/// 登録可能な最古の年
pub const MIN_CARD_YEAR: u32 = 1800;

/// 画像ストア上の参照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// 価格履歴の1点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub price: Option<f64>,
}

/// 登録・更新用の入力
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDraft {
    pub player_name: String,
    pub year: u32,
    pub brand: String,

    #[serde(default)]
    pub team: String,

    #[serde(default)]
    pub card_series: Option<String>,

    #[serde(default)]
    pub card_number: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub is_rookie_card: bool,

    #[serde(default)]
    pub is_autographed: bool,

    #[serde(default)]
    pub image: ImageRef,

    /// 画像認識時の総合信頼度
    #[serde(default)]
    pub recognition_confidence: Option<f64>,
}

impl CardDraft {
    /// 必須項目・年・信頼度を検証し、文字列をトリムした入力を返す
    pub fn validate(&self, current_year: u32) -> Result<CardDraft> {
        let player_name = self.player_name.trim();
        let brand = self.brand.trim();
        if player_name.is_empty() || brand.is_empty() {
            return Err(Error::Validation(
                "Missing required fields (playerName, brand)".into(),
            ));
        }

        if self.year < MIN_CARD_YEAR || self.year > current_year + 1 {
            return Err(Error::Validation(format!("Invalid year: {}", self.year)));
        }

        if let Some(c) = self.recognition_confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(Error::InvalidConfidence(c));
            }
        }

        Ok(CardDraft {
            player_name: player_name.to_string(),
            brand: brand.to_string(),
            team: self.team.trim().to_string(),
            card_series: non_empty(&self.card_series),
            card_number: non_empty(&self.card_number),
            serial_number: non_empty(&self.serial_number),
            notes: non_empty(&self.notes),
            ..self.clone()
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// カードレコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMetadata {
    pub id: CardId,

    #[serde(flatten)]
    pub draft: CardDraft,

    #[serde(default)]
    pub average_price: Option<f64>,

    /// 新しい順
    #[serde(default)]
    pub price_history: Vec<PricePoint>,

    #[serde(default)]
    pub price_last_updated: Option<DateTime<Utc>>,

    pub timestamp: DateTime<Utc>,
}

impl CardMetadata {
    pub fn new(id: CardId, draft: CardDraft, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            draft,
            average_price: None,
            price_history: Vec::new(),
            price_last_updated: None,
            timestamp,
        }
    }

    /// 最終変更時刻（登録/更新と価格更新の新しい方）
    pub fn last_changed(&self) -> DateTime<Utc> {
        match self.price_last_updated {
            Some(updated) if updated > self.timestamp => updated,
            _ => self.timestamp,
        }
    }

    /// 価格を記録（履歴の先頭に追加）
    pub fn record_price(&mut self, price: Option<f64>, at: DateTime<Utc>) {
        self.price_history.insert(0, PricePoint { timestamp: at, price });
        if price.is_some() {
            self.average_price = price;
        }
        self.price_last_updated = Some(at);
    }
}

/// 一括インポート用レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportCard {
    pub id: CardId,
    #[serde(flatten)]
    pub draft: CardDraft,
}

/// 一括インポート結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportResult {
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub errors: Vec<(CardId, String)>,
}

impl BulkImportResult {
    pub fn record_failure(&mut self, id: impl Into<CardId>, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push((id.into(), message.into()));
    }
}

/// 絞り込み条件（指定された条件はすべてAND）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFilters {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub card_series: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub is_rookie_card: Option<bool>,
    #[serde(default)]
    pub is_autographed: Option<bool>,
}

fn eq_filter(filter: &Option<String>, value: &str) -> bool {
    filter
        .as_deref()
        .map_or(true, |f| f.trim().eq_ignore_ascii_case(value.trim()))
}

fn eq_optional_filter(filter: &Option<String>, value: &Option<String>) -> bool {
    match filter {
        None => true,
        Some(_) => value.as_deref().is_some_and(|v| eq_filter(filter, v)),
    }
}

impl CardFilters {
    pub fn matches(&self, card: &CardMetadata) -> bool {
        let d = &card.draft;
        eq_filter(&self.team, &d.team)
            && self.year.map_or(true, |y| y == d.year)
            && eq_filter(&self.brand, &d.brand)
            && eq_optional_filter(&self.card_series, &d.card_series)
            && eq_filter(&self.player_name, &d.player_name)
            && self.is_rookie_card.map_or(true, |r| r == d.is_rookie_card)
            && self.is_autographed.map_or(true, |a| a == d.is_autographed)
    }
}

/// 検索語（大文字小文字無視の部分一致）
pub fn matches_term(card: &CardMetadata, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }

    let d = &card.draft;
    [
        Some(d.player_name.as_str()),
        Some(d.brand.as_str()),
        Some(d.team.as_str()),
        d.card_series.as_deref(),
        d.card_number.as_deref(),
        d.notes.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|v| v.to_lowercase().contains(&term))
}

/// ページング済み検索結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult {
    pub cards: Vec<CardMetadata>,
    pub total: u64,
    pub has_more: bool,
}

/// 新しい順（同時刻はID順）に並べる
pub fn sort_newest_first(cards: &mut [CardMetadata]) {
    cards.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
}

/// 絞り込み・検索・ページング
pub fn search<'a, I>(
    cards: I,
    filters: &CardFilters,
    term: Option<&str>,
    page_size: usize,
    offset: usize,
) -> PaginatedResult
where
    I: IntoIterator<Item = &'a CardMetadata>,
{
    let mut matched: Vec<CardMetadata> = cards
        .into_iter()
        .filter(|c| filters.matches(c))
        .filter(|c| term.map_or(true, |t| matches_term(c, t)))
        .cloned()
        .collect();
    sort_newest_first(&mut matched);

    let total = matched.len();
    let page: Vec<CardMetadata> = matched.into_iter().skip(offset).take(page_size).collect();
    let has_more = offset + page.len() < total;

    PaginatedResult {
        cards: page,
        total: total as u64,
        has_more,
    }
}

/// ユーザー権限
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
    #[default]
    Guest,
}

/// ユーザープロファイル
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
}
