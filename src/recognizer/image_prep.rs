//! 認識前の画像前処理
//!
//! 長辺を `max_size` 以下に縮小し、JPEGに再エンコードする。

use crate::error::{CatalogError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

pub const PREPARED_MIME_TYPE: &str = "image/jpeg";

pub fn prepare_image(bytes: &[u8], max_size: u32) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| CatalogError::ImageLoad(format!("画像をデコードできません: {}", e)))?;

    let img = if img.width().max(img.height()) > max_size {
        img.resize(max_size, max_size, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEGはアルファ非対応のためRGBに変換
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| CatalogError::ImageLoad(format!("JPEGエンコード失敗: {}", e)))?;

    Ok(out.into_inner())
}
