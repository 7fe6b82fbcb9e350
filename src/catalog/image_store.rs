//! カード画像の保存
//!
//! 保存中の進捗を 0..=100 のパーセントで通知する。

use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use card_catalog_common::ImageRef;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// 進捗通知（パーセント）
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

const FILE_URL_PREFIX: &str = "file://";
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(
        &self,
        bytes: &[u8],
        file_name: &str,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<ImageRef>;

    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>>;
}

/// ローカルフォルダへの保存。URLは `file://` 形式
pub struct LocalImageStore {
    root: PathBuf,
    chunk_size: usize,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// チャンク単位で書き込み、失敗したら途中まで書いたファイルを消す
    async fn write_chunks<W>(
        &self,
        path: &Path,
        mut writer: W,
        bytes: &[u8],
        report: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let written: std::io::Result<()> = async {
            let mut written = 0;
            for chunk in bytes.chunks(self.chunk_size) {
                writer.write_all(chunk).await?;
                written += chunk.len();
                report(percent(written, bytes.len()));
            }
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            drop(writer);
            if let Err(remove_err) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %remove_err, "書きかけの画像を削除できません");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// ファイル名をパス区切りや制御文字を含まない形に
fn sanitize_file_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "card.jpg".to_string()
    } else {
        cleaned
    }
}

fn percent(written: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((written as u128 * 100) / total as u128) as u8
}

/// `file://` URLをパスに戻す
pub fn path_from_ref(image: &ImageRef) -> Option<PathBuf> {
    image.url.strip_prefix(FILE_URL_PREFIX).map(PathBuf::from)
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn store(
        &self,
        bytes: &[u8],
        file_name: &str,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<ImageRef> {
        tokio::fs::create_dir_all(&self.root).await?;
        let stored_name = format!("{}-{}", uuid::Uuid::new_v4(), sanitize_file_name(file_name));
        let path = self.root.join(&stored_name);

        let report = |p: u8| {
            if let Some(f) = progress {
                f(p)
            }
        };

        report(0);
        let file = tokio::fs::File::create(&path).await?;
        self.write_chunks(&path, file, bytes, &report).await?;
        if bytes.is_empty() {
            report(100);
        }

        let absolute = tokio::fs::canonicalize(&path).await?;
        debug!(path = %absolute.display(), bytes = bytes.len(), "画像を保存");
        Ok(ImageRef::new(format!("{}{}", FILE_URL_PREFIX, absolute.display())))
    }

    async fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let path = path_from_ref(image)
            .ok_or_else(|| CatalogError::ImageLoad(format!("未対応のURL: {}", image.url)))?;
        if !path.exists() {
            return Err(CatalogError::FileNotFound(path.display().to_string()));
        }
        Ok(tokio::fs::read(&path).await?)
    }
}
