pub mod excel;

use crate::error::Result;
use card_catalog_common::CardMetadata;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXPORT_NAME: &str = "card-catalog";

/// 出力先がフォルダまたは拡張子なしなら既定のファイル名を付ける
pub fn output_path(output: &Path) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.xlsx", DEFAULT_EXPORT_NAME))
    } else {
        output.to_path_buf()
    }
}

pub fn export_catalog(cards: &[CardMetadata], output: &Path) -> Result<PathBuf> {
    let path = output_path(output);
    println!("- Excelを生成中... ({}件)", cards.len());
    excel::generate_excel(cards, &path)?;
    println!("✔ Excel出力: {}", path.display());
    Ok(path)
}
