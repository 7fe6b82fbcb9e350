//! カードカタログの保存先
//!
//! - CatalogStore: カード・価格・ユーザー権限の保存契約
//! - JsonCatalogStore: JSONファイルによるローカル実装
//! - ImageStore / LocalImageStore: カード画像の保存

pub mod image_store;
pub mod json_store;

pub use image_store::{ImageStore, LocalImageStore, ProgressFn};
pub use json_store::JsonCatalogStore;

use crate::error::Result;
use async_trait::async_trait;
use card_catalog_common::{
    BulkImportCard, BulkImportResult, CardDraft, CardFilters, CardId, CardMetadata,
    PaginatedResult, PricePoint, UserProfile, UserRole,
};

/// カタログの保存契約
///
/// 存在しないIDへの操作は `CatalogError::CardNotFound`。
/// 入力は保存前に `CardDraft::validate` で検証する。
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// 追加。`id` が None なら新しいIDを採番する
    async fn add_card(&self, id: Option<CardId>, draft: CardDraft) -> Result<CardMetadata>;

    /// 入力項目を置き換える。価格データは保持し、タイムスタンプを更新
    async fn update_card(&self, id: &str, draft: CardDraft) -> Result<CardMetadata>;

    async fn delete_card(&self, id: &str) -> Result<()>;

    async fn get_card(&self, id: &str) -> Result<CardMetadata>;

    /// 新しい順
    async fn get_all_cards(&self) -> Result<Vec<CardMetadata>>;

    async fn filter_cards(&self, filters: &CardFilters) -> Result<Vec<CardMetadata>>;

    async fn search_cards(
        &self,
        filters: &CardFilters,
        term: Option<&str>,
        page_size: usize,
        offset: usize,
    ) -> Result<PaginatedResult>;

    /// 新しい順
    async fn price_history(&self, id: &str) -> Result<Vec<PricePoint>>;

    /// 価格を記録。None は「価格取得できず」の記録
    async fn record_price(&self, id: &str, price: Option<f64>) -> Result<CardMetadata>;

    /// 登録/更新・価格更新の新しい順に最大 `limit` 件
    async fn recently_changed(&self, limit: usize) -> Result<Vec<CardMetadata>>;

    async fn bulk_import(&self, cards: Vec<BulkImportCard>) -> Result<BulkImportResult>;

    async fn assign_role(&self, user: &str, role: UserRole) -> Result<()>;

    /// 未登録ユーザーは Guest
    async fn role_of(&self, user: &str) -> Result<UserRole>;

    async fn save_profile(&self, user: &str, profile: UserProfile) -> Result<()>;

    async fn profile(&self, user: &str) -> Result<Option<UserProfile>>;
}
