//! JSONファイルによるカタログ保存
//!
//! 全データをメモリに保持し、変更のたびにファイルへ書き出す。
//! 書き込みは `tokio::sync::Mutex` で直列化する。
//! 保存に失敗した変更はメモリにも反映しない。

use super::CatalogStore;
use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use card_catalog_common::catalog::{search, sort_newest_first};
use card_catalog_common::{
    BulkImportCard, BulkImportResult, CardDraft, CardFilters, CardId, CardMetadata,
    PaginatedResult, PricePoint, UserProfile, UserRole,
};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const CATALOG_FILE_NAME: &str = "catalog.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    version: u32,
    #[serde(default)]
    cards: BTreeMap<CardId, CardMetadata>,
    #[serde(default)]
    roles: BTreeMap<String, UserRole>,
    #[serde(default)]
    profiles: BTreeMap<String, UserProfile>,
}

impl CatalogFile {
    const CURRENT_VERSION: u32 = 1;

    fn card_mut(&mut self, id: &str) -> Result<&mut CardMetadata> {
        self.cards
            .get_mut(id)
            .ok_or_else(|| CatalogError::CardNotFound(id.to_string()))
    }
}

impl Default for CatalogFile {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            cards: BTreeMap::new(),
            roles: BTreeMap::new(),
            profiles: BTreeMap::new(),
        }
    }
}

pub struct JsonCatalogStore {
    path: PathBuf,
    state: Mutex<CatalogFile>,
}

impl JsonCatalogStore {
    /// ファイルを開く。無ければ空のカタログ
    ///
    /// 壊れたファイルはエラーにする（上書きでデータを失わないため）
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: CatalogFile = serde_json::from_slice(&bytes)?;
                if file.version != CatalogFile::CURRENT_VERSION {
                    return Err(CatalogError::Config(format!(
                        "未対応のカタログバージョン: {}",
                        file.version
                    )));
                }
                debug!(path = %path.display(), cards = file.cards.len(), "カタログ読み込み");
                file
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogFile::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// データフォルダ内の既定ファイルを開く
    pub async fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(data_dir.join(CATALOG_FILE_NAME)).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 一時ファイルに書いてから置き換える
    async fn persist(&self, state: &CatalogFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// 複製に変更を適用して保存し、保存に成功した場合のみメモリに反映する
    async fn commit<T>(
        &self,
        state: &mut CatalogFile,
        change: impl FnOnce(&mut CatalogFile) -> Result<T>,
    ) -> Result<T> {
        let mut next = state.clone();
        let value = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(value)
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn validate(draft: &CardDraft, now: DateTime<Utc>) -> Result<CardDraft> {
        Ok(draft.validate(now.year() as u32)?)
    }
}

fn newest_first(cards: impl Iterator<Item = CardMetadata>) -> Vec<CardMetadata> {
    let mut cards: Vec<CardMetadata> = cards.collect();
    sort_newest_first(&mut cards);
    cards
}

#[async_trait]
impl CatalogStore for JsonCatalogStore {
    async fn add_card(&self, id: Option<CardId>, draft: CardDraft) -> Result<CardMetadata> {
        let now = Self::now();
        let draft = Self::validate(&draft, now)?;
        let id = match id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let mut state = self.state.lock().await;
        if state.cards.contains_key(&id) {
            return Err(CatalogError::DuplicateCard(id));
        }

        let card = CardMetadata::new(id.clone(), draft, now);
        self.commit(&mut state, |file| {
            file.cards.insert(id.clone(), card.clone());
            Ok(())
        })
        .await?;

        info!(id = %id, player = %card.draft.player_name, "カードを追加");
        Ok(card)
    }

    async fn update_card(&self, id: &str, draft: CardDraft) -> Result<CardMetadata> {
        let now = Self::now();
        let draft = Self::validate(&draft, now)?;

        let mut state = self.state.lock().await;
        let updated = self
            .commit(&mut state, |file| {
                let card = file.card_mut(id)?;
                card.draft = draft;
                card.timestamp = now;
                Ok(card.clone())
            })
            .await?;

        info!(id, "カードを更新");
        Ok(updated)
    }

    async fn delete_card(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.commit(&mut state, |file| {
            file.cards
                .remove(id)
                .map(drop)
                .ok_or_else(|| CatalogError::CardNotFound(id.to_string()))
        })
        .await?;

        info!(id, "カードを削除");
        Ok(())
    }

    async fn get_card(&self, id: &str) -> Result<CardMetadata> {
        self.state
            .lock()
            .await
            .cards
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::CardNotFound(id.to_string()))
    }

    async fn get_all_cards(&self) -> Result<Vec<CardMetadata>> {
        let state = self.state.lock().await;
        Ok(newest_first(state.cards.values().cloned()))
    }

    async fn filter_cards(&self, filters: &CardFilters) -> Result<Vec<CardMetadata>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state.cards.values().filter(|c| filters.matches(c)).cloned(),
        ))
    }

    async fn search_cards(
        &self,
        filters: &CardFilters,
        term: Option<&str>,
        page_size: usize,
        offset: usize,
    ) -> Result<PaginatedResult> {
        let state = self.state.lock().await;
        Ok(search(state.cards.values(), filters, term, page_size, offset))
    }

    async fn price_history(&self, id: &str) -> Result<Vec<PricePoint>> {
        Ok(self.get_card(id).await?.price_history)
    }

    async fn record_price(&self, id: &str, price: Option<f64>) -> Result<CardMetadata> {
        if let Some(p) = price {
            if !p.is_finite() || p < 0.0 {
                return Err(CatalogError::Validation(format!("不正な価格: {}", p)));
            }
        }

        let mut state = self.state.lock().await;
        let updated = self
            .commit(&mut state, |file| {
                let card = file.card_mut(id)?;
                card.record_price(price, Self::now());
                Ok(card.clone())
            })
            .await?;

        debug!(id, ?price, "価格を記録");
        Ok(updated)
    }

    async fn recently_changed(&self, limit: usize) -> Result<Vec<CardMetadata>> {
        let state = self.state.lock().await;
        let mut cards: Vec<CardMetadata> = state.cards.values().cloned().collect();
        cards.sort_by(|a, b| {
            b.last_changed()
                .cmp(&a.last_changed())
                .then_with(|| a.id.cmp(&b.id))
        });
        cards.truncate(limit);
        Ok(cards)
    }

    async fn bulk_import(&self, cards: Vec<BulkImportCard>) -> Result<BulkImportResult> {
        let now = Self::now();
        let mut result = BulkImportResult::default();
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        for item in cards {
            let id = item.id.trim().to_string();
            if id.is_empty() {
                result.record_failure(item.id, "Missing card id");
                continue;
            }

            let draft = match Self::validate(&item.draft, now) {
                Ok(draft) => draft,
                Err(e) => {
                    result.record_failure(id, e.to_string());
                    continue;
                }
            };

            match next.cards.get_mut(&id) {
                Some(existing) => {
                    existing.draft = draft;
                    existing.timestamp = now;
                    result.updated += 1;
                }
                None => {
                    next.cards.insert(id.clone(), CardMetadata::new(id, draft, now));
                    result.created += 1;
                }
            }
        }

        if result.created + result.updated > 0 {
            self.persist(&next).await?;
            *state = next;
        }

        info!(
            created = result.created,
            updated = result.updated,
            failed = result.failed,
            "一括インポート完了"
        );
        Ok(result)
    }

    async fn assign_role(&self, user: &str, role: UserRole) -> Result<()> {
        let mut state = self.state.lock().await;
        self.commit(&mut state, |file| {
            file.roles.insert(user.to_string(), role);
            Ok(())
        })
        .await
    }

    async fn role_of(&self, user: &str) -> Result<UserRole> {
        let state = self.state.lock().await;
        Ok(state.roles.get(user).copied().unwrap_or_default())
    }

    async fn save_profile(&self, user: &str, profile: UserProfile) -> Result<()> {
        if profile.name.trim().is_empty() {
            return Err(CatalogError::Validation("プロファイル名が空です".into()));
        }
        let mut state = self.state.lock().await;
        self.commit(&mut state, |file| {
            file.profiles.insert(user.to_string(), profile);
            Ok(())
        })
        .await
    }

    async fn profile(&self, user: &str) -> Result<Option<UserProfile>> {
        let state = self.state.lock().await;
        Ok(state.profiles.get(user).cloned())
    }
}
