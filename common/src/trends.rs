//! 価格推移の集計

use crate::catalog::CardMetadata;
use serde::Serialize;

pub const DEFAULT_TREND_LIMIT: usize = 5;

/// 直近2点の価格変化
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueTrend {
    pub card_id: String,
    pub player_name: String,
    pub brand: String,
    pub year: u32,
    pub latest: f64,
    pub previous: f64,
    pub change: f64,
    pub percent_change: f64,
}

/// 変化率の絶対値が大きい順に上位 `limit` 件
///
/// 直近2点の両方に価格があるカードのみ対象。前回価格が0なら変化率は0。
pub fn value_trends(cards: &[CardMetadata], limit: usize) -> Vec<ValueTrend> {
    let mut trends: Vec<ValueTrend> = cards
        .iter()
        .filter_map(|card| {
            let latest = card.price_history.first()?.price?;
            let previous = card.price_history.get(1)?.price?;
            let change = latest - previous;
            let percent_change = if previous != 0.0 {
                change / previous * 100.0
            } else {
                0.0
            };
            Some(ValueTrend {
                card_id: card.id.clone(),
                player_name: card.draft.player_name.clone(),
                brand: card.draft.brand.clone(),
                year: card.draft.year,
                latest,
                previous,
                change,
                percent_change,
            })
        })
        .collect();

    trends.sort_by(|a, b| b.percent_change.abs().total_cmp(&a.percent_change.abs()));
    trends.truncate(limit);
    trends
}

/// ページ内カードの平均価格合計
pub fn page_value(cards: &[CardMetadata]) -> f64 {
    cards.iter().filter_map(|c| c.average_price).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CardDraft;
    use chrono::{TimeZone, Utc};

    fn card_with_prices(id: &str, prices: &[Option<f64>]) -> CardMetadata {
        let draft = CardDraft {
            player_name: format!("Player {}", id),
            year: 2000,
            brand: "Topps".into(),
            ..Default::default()
        };
        let mut card = CardMetadata::new(id.into(), draft, Utc.timestamp_opt(0, 0).unwrap());
        // 古い順に記録 → 履歴は新しい順になる
        for (i, p) in prices.iter().enumerate() {
            card.record_price(*p, Utc.timestamp_opt(i as i64 + 1, 0).unwrap());
        }
        card
    }

    #[test]
    fn test_value_trends_sorted_by_abs_percent() {
        let cards = vec![
            card_with_prices("a", &[Some(10.0), Some(11.0)]),  // +10%
            card_with_prices("b", &[Some(10.0), Some(5.0)]),   // -50%
            card_with_prices("c", &[Some(10.0), Some(12.5)]),  // +25%
        ];

        let trends = value_trends(&cards, DEFAULT_TREND_LIMIT);
        let ids: Vec<_> = trends.iter().map(|t| t.card_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!((trends[0].percent_change + 50.0).abs() < 1e-9);
        assert!((trends[0].change + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_value_trends_skips_short_or_missing_history() {
        let cards = vec![
            card_with_prices("one", &[Some(3.0)]),
            card_with_prices("gap", &[Some(3.0), None]),
            card_with_prices("ok", &[Some(2.0), Some(4.0)]),
        ];
        let trends = value_trends(&cards, 5);
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].card_id, "ok");
    }

    #[test]
    fn test_value_trends_zero_previous() {
        let cards = vec![card_with_prices("z", &[Some(0.0), Some(4.0)])];
        let trends = value_trends(&cards, 5);
        assert_eq!(trends[0].percent_change, 0.0);
        assert_eq!(trends[0].change, 4.0);
    }

    #[test]
    fn test_value_trends_limit() {
        let cards: Vec<_> = (0..8)
            .map(|i| card_with_prices(&i.to_string(), &[Some(1.0), Some(1.0 + i as f64)]))
            .collect();
        assert_eq!(value_trends(&cards, 5).len(), 5);
    }

    #[test]
    fn test_page_value() {
        let cards = vec![
            card_with_prices("a", &[Some(10.0)]),
            card_with_prices("b", &[]),
            card_with_prices("c", &[Some(2.5)]),
        ];
        assert!((page_value(&cards) - 12.5).abs() < 1e-9);
    }
}
