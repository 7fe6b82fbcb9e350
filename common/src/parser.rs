//! APIレスポンスパーサー
//!
//! AI CLI / Gemini のレスポンスからJSONを抽出し、
//! primaryステージ（カード識別）とfallbackステージ（OCRテキスト）の結果をパースする

use crate::confidence::FieldWeights;
use crate::error::{Error, Result};
use crate::types::{CardField, CardFields, RecognitionAttempt, StageMethod};
use serde::Deserialize;

/// APIレスポンスからJSON部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の {...} オブジェクト
/// 3. エラー
///
/// # Examples
/// ```
/// use card_catalog_common::extract_json;
///
/// let response = "result: {\"success\": true}";
/// let json = extract_json(response).unwrap();
/// assert_eq!(json, "{\"success\": true}");
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    // ```json ... ``` ブロックを探す
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7; // "```json" の長さ
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    // 生の {...} を探す
    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end >= start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("JSONが見つかりません".into()))
}

/// カード識別レスポンス（モデル側の総合信頼度は受け取らない）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentificationResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    fields: CardFields,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// OCRレスポンス
#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
}

/// カード識別レスポンスをパースして試行結果を作る
///
/// 値が空の項目は「得られなかった」として除外する。
/// 総合信頼度は常に項目信頼度から再計算する。
pub fn parse_identification_response(
    response: &str,
    method: StageMethod,
    weights: &FieldWeights,
) -> Result<RecognitionAttempt> {
    let json_str = extract_json(response)?;
    let parsed: IdentificationResponse = serde_json::from_str(json_str.trim())
        .map_err(|e| Error::Parse(format!("識別レスポンス JSONパースエラー: {}", e)))?;

    if !parsed.success {
        let message = parsed
            .error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "No card detected".to_string());
        return Ok(RecognitionAttempt::failed(method, message));
    }

    let mut fields = parsed.fields;
    for field in CardField::ALL {
        if fields.get(field).is_some_and(|fc| fc.value().trim().is_empty()) {
            fields.set(field, None);
        }
    }

    Ok(RecognitionAttempt::succeeded(method, fields, weights))
}

/// OCRレスポンスからテキストを取り出す
///
/// `{"text": "..."}` 形式があればその中身、無ければレスポンス全体をテキストとみなす
pub fn parse_ocr_response(response: &str) -> String {
    extract_json(response)
        .ok()
        .and_then(|json| serde_json::from_str::<OcrResponse>(json).ok())
        .map(|r| r.text)
        .unwrap_or_else(|| response.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================
    // extract_json テスト
    // =============================================

    #[test]
    fn test_extract_json_with_block() {
        let response = r#"Here is the card:
```json
{"success": true, "fields": {}}
```
Some additional text."#;

        let json = extract_json(response).unwrap();
        assert_eq!(json, r#"{"success": true, "fields": {}}"#);
    }

    #[test]
    fn test_extract_json_with_surrounding_text() {
        let response = r#"Result: {"key": "value"} done."#;

        let json = extract_json(response).unwrap();
        assert_eq!(json, r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_error() {
        let result = extract_json("No JSON here, just plain text.");
        if let Err(Error::Parse(msg)) = result {
            assert!(msg.contains("JSONが見つかりません"));
        } else {
            panic!("Expected Parse error");
        }
    }

    #[test]
    fn test_extract_json_empty_response() {
        assert!(extract_json("").is_err());
    }

    // =============================================
    // parse_identification_response テスト
    // =============================================

    #[test]
    fn test_parse_identification_full() {
        let response = r#"```json
{
  "success": true,
  "overallConfidence": 0.99,
  "fields": {
    "playerName": {"value": "Robin Yount", "confidence": 0.9},
    "year": {"value": "1982", "confidence": 0.8},
    "brand": {"value": "Topps", "confidence": 0.8},
    "cardSeries": {"value": "Stadium Club", "confidence": 0.6}
  }
}
```"#;

        let attempt =
            parse_identification_response(response, StageMethod::Primary, &FieldWeights::STANDARD)
                .unwrap();

        assert!(attempt.success());
        assert_eq!(attempt.method(), StageMethod::Primary);
        let expected = 0.9 * 0.35 + 0.8 * 0.25 + 0.8 * 0.25 + 0.6 * 0.15;
        assert!((attempt.overall_confidence() - expected).abs() < 1e-9);

        let fields = attempt.fields().unwrap();
        assert_eq!(fields.player_name.as_ref().unwrap().value(), "Robin Yount");
    }

    #[test]
    fn test_parse_identification_drops_empty_values() {
        let response = r#"{"fields": {
            "playerName": {"value": "Josh Hader", "confidence": 0.8},
            "cardSeries": {"value": "  ", "confidence": 0.9},
            "year": null
        }}"#;

        let attempt =
            parse_identification_response(response, StageMethod::Primary, &FieldWeights::STANDARD)
                .unwrap();
        let fields = attempt.fields().unwrap();
        assert!(fields.card_series.is_none());
        assert!(fields.year.is_none());
        assert!((attempt.overall_confidence() - 0.8 * 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_parse_identification_not_detected() {
        let response = r#"{"success": false, "error": "No card in image"}"#;

        let attempt =
            parse_identification_response(response, StageMethod::Primary, &FieldWeights::STANDARD)
                .unwrap();
        assert!(!attempt.success());
        assert_eq!(attempt.error(), Some("No card in image"));
    }

    #[test]
    fn test_parse_identification_invalid_confidence() {
        let response = r#"{"fields": {"brand": {"value": "Topps", "confidence": 85}}}"#;

        let result =
            parse_identification_response(response, StageMethod::Primary, &FieldWeights::STANDARD);
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_identification_no_json() {
        let result = parse_identification_response(
            "I cannot see a card.",
            StageMethod::Fallback,
            &FieldWeights::STANDARD,
        );
        assert!(result.is_err());
    }

    // =============================================
    // parse_ocr_response テスト
    // =============================================

    #[test]
    fn test_parse_ocr_response_json() {
        let text = parse_ocr_response(r#"{"text": "1982 TOPPS\nROBIN YOUNT"}"#);
        assert_eq!(text, "1982 TOPPS\nROBIN YOUNT");
    }

    #[test]
    fn test_parse_ocr_response_plain() {
        let text = parse_ocr_response("  1982 Topps Robin Yount  ");
        assert_eq!(text, "1982 Topps Robin Yount");
    }
}
