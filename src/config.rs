use crate::ai_provider::AiProvider;
use crate::error::{CatalogError, Result};
use card_catalog_common::FieldWeights;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// primaryステージ（カード識別）のプロバイダ
    pub primary_provider: AiProvider,
    /// fallbackステージ（OCR）のプロバイダ
    pub fallback_provider: AiProvider,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub max_image_size: u32,
    pub stage_timeout_seconds: u64,
    /// カタログと画像の保存先（未指定時は ~/.local/share/card-catalog）
    pub data_dir: Option<PathBuf>,
    /// 項目の重み（未指定時は標準重み）
    pub field_weights: Option<FieldWeights>,
    /// エイリアスプリセット
    pub alias_preset: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_provider: AiProvider::Claude,
            fallback_provider: AiProvider::Claude,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".into(),
            max_image_size: 1568,  // Claude Vision推奨サイズ
            stage_timeout_seconds: 60,
            data_dir: None,
            field_weights: None,
            alias_preset: Some("standard".into()),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CatalogError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("card-catalog").join("config.json"))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_local_dir()
            .ok_or_else(|| CatalogError::Config("データディレクトリが見つかりません".into()))?;
        Ok(base.join("card-catalog"))
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_seconds)
    }

    pub fn weights(&self) -> FieldWeights {
        self.field_weights.unwrap_or(FieldWeights::STANDARD)
    }

    pub fn get_gemini_api_key(&self) -> Result<String> {
        // 環境変数を優先
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.gemini_api_key.clone().ok_or(CatalogError::MissingApiKey)
    }

    pub fn set_gemini_api_key(&mut self, key: String) -> Result<()> {
        self.gemini_api_key = Some(key);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.primary_provider, AiProvider::Claude);
        assert_eq!(config.stage_timeout(), Duration::from_secs(60));
        assert_eq!(config.weights(), FieldWeights::STANDARD);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"fallback_provider": "gemini"}"#).unwrap();
        assert_eq!(config.fallback_provider, AiProvider::Gemini);
        assert_eq!(config.max_image_size, 1568);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let json = r#"{"field_weights": {"playerName": 0.9, "year": 0.9, "brand": 0.0, "cardSeries": 0.0}}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn test_data_dir_override() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/cards")),
            ..Default::default()
        };
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/cards"));
    }
}
