//! OCRテキストからのカード項目抽出
//!
//! fallbackステージ用。カード表面の印字テキストから
//! 年・ブランド・シリーズ・選手名を推定し、ヒューリスティックな信頼度を付ける。

use crate::types::{CardFields, FieldConfidence};
use regex::Regex;

/// 既知のブランド
pub const KNOWN_BRANDS: &[&str] = &[
    "Upper Deck",
    "Topps",
    "Panini",
    "Donruss",
    "Fleer",
    "Bowman",
    "Score",
    "Leaf",
];

/// 既知のシリーズ
pub const KNOWN_SERIES: &[&str] = &[
    "Stadium Club",
    "Chrome",
    "Heritage",
    "Finest",
    "Select",
    "Prizm",
    "Update",
    "Gallery",
];

/// 選手名候補から除外する語
const NAME_STOPWORDS: &[&str] = &[
    "ROOKIE", "CARD", "BASEBALL", "MLB", "RC", "AUTO", "AUTOGRAPH", "OUTFIELD", "INFIELD",
    "PITCHER", "CATCHER", "SHORTSTOP", "BASE", "MILWAUKEE", "BREWERS", "LEAGUE", "AMERICAN",
    "NATIONAL", "ALL", "STAR", "SERIES", "EDITION", "LIMITED",
];

const BRAND_CONFIDENCE: f64 = 0.8;
const SERIES_CONFIDENCE: f64 = 0.65;
const COPYRIGHT_YEAR_CONFIDENCE: f64 = 0.85;
const SINGLE_YEAR_CONFIDENCE: f64 = 0.7;
const AMBIGUOUS_YEAR_CONFIDENCE: f64 = 0.45;
const SINGLE_NAME_CONFIDENCE: f64 = 0.6;
const AMBIGUOUS_NAME_CONFIDENCE: f64 = 0.4;

/// OCRテキストから4項目を抽出
pub fn extract_fields_from_text(text: &str) -> CardFields {
    CardFields {
        player_name: extract_player_name(text),
        year: extract_year(text),
        brand: find_known(text, KNOWN_BRANDS, BRAND_CONFIDENCE),
        card_series: find_known(text, KNOWN_SERIES, SERIES_CONFIDENCE),
    }
}

/// 年を抽出
///
/// ©直後の年を最優先。それ以外は候補が1種類なら中程度、
/// 複数あれば最新の年を低信頼度で採用する（裏面の成績年を避けるため）
pub fn extract_year(text: &str) -> Option<FieldConfidence> {
    lazy_static::lazy_static! {
        static ref COPYRIGHT_RE: Regex =
            Regex::new(r"(?i)(?:©|\(c\)|copyright)\s*((?:19|20)\d{2})\b").unwrap();
        static ref YEAR_RE: Regex = Regex::new(r"\b((?:19|20)\d{2})\b").unwrap();
    }

    if let Some(cap) = COPYRIGHT_RE.captures(text) {
        return FieldConfidence::new(&cap[1], COPYRIGHT_YEAR_CONFIDENCE).ok();
    }

    let mut years: Vec<&str> = YEAR_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let m = cap.get(1)?;
            // シリアル番号（15/25, #2011 など）の一部は除外
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            let in_serial = matches!(before, Some('/') | Some('#'))
                || matches!(after, Some('/'));
            (!in_serial).then_some(m.as_str())
        })
        .collect();
    years.sort_unstable();
    years.dedup();

    match years.as_slice() {
        [] => None,
        [only] => FieldConfidence::new(*only, SINGLE_YEAR_CONFIDENCE).ok(),
        [.., latest] => FieldConfidence::new(*latest, AMBIGUOUS_YEAR_CONFIDENCE).ok(),
    }
}

/// 既知リストから最初に見つかった名称（大文字小文字無視、単語境界）
fn find_known(text: &str, known: &[&str], confidence: f64) -> Option<FieldConfidence> {
    known.iter().find_map(|name| {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(name));
        let re = Regex::new(&pattern).ok()?;
        if re.is_match(text) {
            FieldConfidence::new(*name, confidence).ok()
        } else {
            None
        }
    })
}

fn is_known_name(word: &str) -> bool {
    KNOWN_BRANDS
        .iter()
        .chain(KNOWN_SERIES.iter())
        .flat_map(|name| name.split_whitespace())
        .any(|w| w.eq_ignore_ascii_case(word))
}

/// 選手名を抽出
///
/// 2〜3語の大文字始まりの単語だけで構成された行を候補とし、
/// ブランド・シリーズ名や定型語を含む行は除外する
pub fn extract_player_name(text: &str) -> Option<FieldConfidence> {
    lazy_static::lazy_static! {
        static ref NAME_WORD_RE: Regex = Regex::new(r"^[A-Z][A-Za-z'\.\-]*$").unwrap();
    }

    let candidates: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let words: Vec<&str> = line.split_whitespace().collect();
            if !(2..=3).contains(&words.len()) {
                return None;
            }
            let all_name_words = words.iter().all(|w| {
                NAME_WORD_RE.is_match(w)
                    && !is_known_name(w)
                    && !NAME_STOPWORDS.iter().any(|s| s.eq_ignore_ascii_case(w))
            });
            all_name_words.then(|| title_case(&words))
        })
        .collect();

    let confidence = match candidates.len() {
        0 => return None,
        1 => SINGLE_NAME_CONFIDENCE,
        _ => AMBIGUOUS_NAME_CONFIDENCE,
    };
    FieldConfidence::new(candidates[0].clone(), confidence).ok()
}

fn title_case(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
