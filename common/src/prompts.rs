//! プロンプト生成モジュール
//!
//! 認識ステージごとのプロンプト:
//! - build_identification_prompt: primaryステージ（カード識別、項目別信頼度付き）
//! - build_ocr_prompt: fallbackステージ（カード表面の印字テキスト抽出）

use crate::ocr::{KNOWN_BRANDS, KNOWN_SERIES};

/// primaryステージ用プロンプト
pub fn build_identification_prompt() -> String {
    let brands = KNOWN_BRANDS.join(", ");
    let series = KNOWN_SERIES.join(", ");

    format!(
        r#"あなたはスポーツトレーディングカードの鑑定士です。画像のカードを識別してください。

## 識別する項目
- playerName: 選手名（カードに印字された表記）
- year: 発行年（4桁）
- brand: 製造ブランド（例: {brands}）
- cardSeries: シリーズ名（例: {series}）

## 出力形式（厳密にこのJSON形式で出力）
{{
  "success": true/false,
  "fields": {{
    "playerName": {{ "value": "選手名", "confidence": 0.0-1.0 }},
    "year": {{ "value": "1982", "confidence": 0.0-1.0 }},
    "brand": {{ "value": "ブランド", "confidence": 0.0-1.0 }},
    "cardSeries": {{ "value": "シリーズ", "confidence": 0.0-1.0 }}
  }},
  "error": "カードが見つからない場合の理由"
}}

## 注意
- confidence は各項目の確からしさ（0.0-1.0の小数）
- 読み取れない項目は出力しない（推測で埋めない）
- カードが写っていない場合は success を false にする
- JSONのみ出力。説明文は不要"#
    )
}

/// fallbackステージ用プロンプト
pub fn build_ocr_prompt() -> String {
    r#"画像のカードに印字されているテキストをすべて書き起こしてください。

## 出力形式（厳密にこのJSON形式で出力）
{ "text": "1行ごとに改行した印字テキスト" }

## 注意
- 表記は画像のまま（大文字小文字・記号も維持）
- 解釈や補足は不要。読めない部分は省略
- JSONのみ出力"#
        .to_string()
}
