//! カタログのExcel出力
//!
//! - 「カード一覧」シート: 1行1カード
//! - 「価格動向」シート: 価格変動の大きいカード

use crate::error::{CatalogError, Result};
use card_catalog_common::catalog::sort_newest_first;
use card_catalog_common::trends::DEFAULT_TREND_LIMIT;
use card_catalog_common::{page_value, value_trends, CardMetadata};
use rust_xlsxwriter::*;
use std::path::Path;

const CARD_HEADERS: &[(&str, f64)] = &[
    ("ID", 38.0),
    ("選手名", 24.0),
    ("年", 8.0),
    ("ブランド", 16.0),
    ("シリーズ", 16.0),
    ("チーム", 22.0),
    ("カード番号", 12.0),
    ("シリアル", 12.0),
    ("ルーキー", 9.0),
    ("サイン", 9.0),
    ("平均価格", 12.0),
    ("認識信頼度", 12.0),
    ("登録日時", 20.0),
    ("メモ", 30.0),
];

const TREND_HEADERS: &[(&str, f64)] = &[
    ("ID", 38.0),
    ("選手名", 24.0),
    ("前回価格", 12.0),
    ("最新価格", 12.0),
    ("変動額", 12.0),
    ("変動率", 10.0),
];

fn xlsx_err(context: &str) -> impl Fn(XlsxError) -> CatalogError + '_ {
    move |e| CatalogError::ExcelGeneration(format!("{}: {}", context, e))
}

fn write_headers(worksheet: &mut Worksheet, headers: &[(&str, f64)], format: &Format) -> Result<()> {
    for (col, (label, width)) in headers.iter().enumerate() {
        let col = col as u16;
        worksheet
            .write_string_with_format(0, col, *label, format)
            .map_err(xlsx_err("見出し書き込みエラー"))?;
        worksheet
            .set_column_width(col, *width)
            .map_err(xlsx_err("列幅設定エラー"))?;
    }
    worksheet
        .set_freeze_panes(1, 0)
        .map_err(xlsx_err("ウィンドウ枠固定エラー"))?;
    Ok(())
}

/// Excelをバッファに生成
pub fn generate_excel_buffer(cards: &[CardMetadata]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0x333333))
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xAAAAAA));
    let price_format = Format::new().set_num_format("#,##0.00");
    let percent_format = Format::new().set_num_format("0%");
    let change_format = Format::new().set_num_format("+0.0;-0.0;0.0");
    let total_format = Format::new().set_bold().set_num_format("#,##0.00");

    let mut sorted = cards.to_vec();
    sort_newest_first(&mut sorted);

    // カード一覧
    let sheet = workbook.add_worksheet();
    sheet.set_name("カード一覧").map_err(xlsx_err("シート名設定エラー"))?;
    write_headers(sheet, CARD_HEADERS, &header_format)?;

    for (i, card) in sorted.iter().enumerate() {
        let row = i as u32 + 1;
        let d = &card.draft;
        let text_cells: [(u16, &str); 8] = [
            (0, card.id.as_str()),
            (1, d.player_name.as_str()),
            (3, d.brand.as_str()),
            (4, d.card_series.as_deref().unwrap_or("")),
            (5, d.team.as_str()),
            (6, d.card_number.as_deref().unwrap_or("")),
            (7, d.serial_number.as_deref().unwrap_or("")),
            (13, d.notes.as_deref().unwrap_or("")),
        ];
        for (col, value) in text_cells {
            sheet
                .write_string(row, col, value)
                .map_err(xlsx_err("セル書き込みエラー"))?;
        }
        sheet
            .write_number(row, 2, d.year as f64)
            .map_err(xlsx_err("セル書き込みエラー"))?;
        sheet
            .write_boolean(row, 8, d.is_rookie_card)
            .map_err(xlsx_err("セル書き込みエラー"))?;
        sheet
            .write_boolean(row, 9, d.is_autographed)
            .map_err(xlsx_err("セル書き込みエラー"))?;
        if let Some(price) = card.average_price {
            sheet
                .write_number_with_format(row, 10, price, &price_format)
                .map_err(xlsx_err("セル書き込みエラー"))?;
        }
        if let Some(confidence) = d.recognition_confidence {
            sheet
                .write_number_with_format(row, 11, confidence, &percent_format)
                .map_err(xlsx_err("セル書き込みエラー"))?;
        }
        sheet
            .write_string(row, 12, card.timestamp.format("%Y-%m-%d %H:%M").to_string())
            .map_err(xlsx_err("セル書き込みエラー"))?;
    }

    // 合計行
    let total_row = sorted.len() as u32 + 1;
    sheet
        .write_string_with_format(total_row, 9, "合計", &header_format)
        .map_err(xlsx_err("合計行書き込みエラー"))?;
    sheet
        .write_number_with_format(total_row, 10, page_value(&sorted), &total_format)
        .map_err(xlsx_err("合計行書き込みエラー"))?;

    // 価格動向
    let trends = value_trends(&sorted, DEFAULT_TREND_LIMIT);
    let sheet = workbook.add_worksheet();
    sheet.set_name("価格動向").map_err(xlsx_err("シート名設定エラー"))?;
    write_headers(sheet, TREND_HEADERS, &header_format)?;

    for (i, trend) in trends.iter().enumerate() {
        let row = i as u32 + 1;
        sheet
            .write_string(row, 0, trend.card_id.as_str())
            .map_err(xlsx_err("セル書き込みエラー"))?;
        sheet
            .write_string(row, 1, trend.player_name.as_str())
            .map_err(xlsx_err("セル書き込みエラー"))?;
        sheet
            .write_number_with_format(row, 2, trend.previous, &price_format)
            .map_err(xlsx_err("セル書き込みエラー"))?;
        sheet
            .write_number_with_format(row, 3, trend.latest, &price_format)
            .map_err(xlsx_err("セル書き込みエラー"))?;
        sheet
            .write_number_with_format(row, 4, trend.change, &change_format)
            .map_err(xlsx_err("セル書き込みエラー"))?;
        sheet
            .write_number_with_format(row, 5, trend.percent_change / 100.0, &percent_format)
            .map_err(xlsx_err("セル書き込みエラー"))?;
    }

    workbook
        .save_to_buffer()
        .map_err(xlsx_err("Excel保存エラー"))
}

pub fn generate_excel(cards: &[CardMetadata], output_path: &Path) -> Result<()> {
    let buffer = generate_excel_buffer(cards)?;
    std::fs::write(output_path, buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_catalog_common::CardDraft;
    use chrono::{TimeZone, Utc};

    fn card(id: &str, prices: &[f64]) -> CardMetadata {
        let draft = CardDraft {
            player_name: "Paul Molitor".into(),
            year: 1978,
            brand: "Topps".into(),
            team: "Milwaukee Brewers".into(),
            is_rookie_card: true,
            ..Default::default()
        };
        let mut card = CardMetadata::new(
            id.into(),
            draft,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        for (i, price) in prices.iter().enumerate() {
            card.record_price(
                Some(*price),
                Utc.with_ymd_and_hms(2024, 2, 1 + i as u32, 0, 0, 0).unwrap(),
            );
        }
        card
    }

    #[test]
    fn test_buffer_is_xlsx_zip() {
        let buffer = generate_excel_buffer(&[card("a", &[10.0, 12.5]), card("b", &[])]).unwrap();
        assert!(buffer.starts_with(b"PK"));
    }

    #[test]
    fn test_empty_catalog_still_exports() {
        let buffer = generate_excel_buffer(&[]).unwrap();
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_generate_excel_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        generate_excel(&[card("a", &[5.0])], &path).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }
}
