//! AIビジョンによる認識ステージ
//!
//! - primary: カード識別プロンプト → 項目ごとの信頼度付きJSON
//! - fallback: OCRプロンプト → 印字テキストからヒューリスティック抽出

use super::image_prep::{prepare_image, PREPARED_MIME_TYPE};
use super::{cli_backend, gemini, Recognizer};
use crate::ai_provider::AiProvider;
use crate::config::Config;
use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use card_catalog_common::{
    build_aliases, build_identification_prompt, build_ocr_prompt, extract_fields_from_text,
    parse_identification_response, parse_ocr_response, AliasConfig, FieldWeights,
    RecognitionAttempt, StageMethod,
};
use tracing::debug;

pub const NO_CARD_TEXT_MESSAGE: &str = "No card text detected";

/// 問い合わせ先
#[derive(Debug, Clone)]
pub enum VisionBackend {
    /// ローカルCLI（claude / codex）
    Cli(AiProvider),
    Gemini { api_key: String, model: String },
}

impl VisionBackend {
    pub fn from_provider(provider: AiProvider, config: &Config) -> Result<Self> {
        match provider {
            AiProvider::Gemini => Ok(VisionBackend::Gemini {
                api_key: config.get_gemini_api_key()?,
                model: config.gemini_model.clone(),
            }),
            cli => Ok(VisionBackend::Cli(cli)),
        }
    }

    fn label(&self) -> &str {
        match self {
            VisionBackend::Cli(provider) => provider.command_name(),
            VisionBackend::Gemini { .. } => "gemini",
        }
    }
}

pub struct VisionRecognizer {
    stage: StageMethod,
    backend: VisionBackend,
    weights: FieldWeights,
    aliases: AliasConfig,
    max_image_size: u32,
    name: String,
    client: reqwest::Client,
}

impl VisionRecognizer {
    pub fn new(stage: StageMethod, backend: VisionBackend) -> Self {
        let name = format!("{}-{}", backend.label(), stage);
        Self {
            stage,
            backend,
            weights: FieldWeights::STANDARD,
            aliases: AliasConfig::default(),
            max_image_size: Config::default().max_image_size,
            name,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_weights(mut self, weights: FieldWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_aliases(mut self, aliases: AliasConfig) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_max_image_size(mut self, max_image_size: u32) -> Self {
        self.max_image_size = max_image_size;
        self
    }

    /// 設定からステージ用の認識機能を構築
    pub fn from_config(stage: StageMethod, config: &Config) -> Result<Self> {
        let provider = match stage {
            StageMethod::Primary => config.primary_provider,
            StageMethod::Fallback => config.fallback_provider,
        };
        let backend = VisionBackend::from_provider(provider, config)?;
        let aliases = build_aliases(config.alias_preset.as_deref(), None)?;

        Ok(Self::new(stage, backend)
            .with_weights(config.weights())
            .with_aliases(aliases)
            .with_max_image_size(config.max_image_size))
    }

    fn prompt(&self) -> String {
        match self.stage {
            StageMethod::Primary => build_identification_prompt(),
            StageMethod::Fallback => build_ocr_prompt(),
        }
    }

    /// モデル応答を試行結果に変換
    fn interpret(&self, response: &str) -> Result<RecognitionAttempt> {
        let attempt = match self.stage {
            StageMethod::Primary => {
                parse_identification_response(response, StageMethod::Primary, &self.weights)
                    .map_err(|e| CatalogError::ApiParse(e.to_string()))?
            }
            StageMethod::Fallback => {
                let text = parse_ocr_response(response);
                let fields = extract_fields_from_text(&text);
                if fields.is_empty() {
                    RecognitionAttempt::failed(StageMethod::Fallback, NO_CARD_TEXT_MESSAGE)
                } else {
                    RecognitionAttempt::succeeded(StageMethod::Fallback, fields, &self.weights)
                }
            }
        };

        if attempt.success() && !self.aliases.is_empty() {
            Ok(self.aliases.apply(&attempt))
        } else {
            Ok(attempt)
        }
    }
}

#[async_trait]
impl Recognizer for VisionRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(&self, image: &[u8]) -> Result<RecognitionAttempt> {
        let prepared = prepare_image(image, self.max_image_size)?;
        let prompt = self.prompt();

        let response = match &self.backend {
            VisionBackend::Cli(provider) => {
                cli_backend::run_with_image(*provider, &prompt, &prepared).await?
            }
            VisionBackend::Gemini { api_key, model } => {
                gemini::generate(&self.client, api_key, model, &prompt, &prepared, PREPARED_MIME_TYPE)
                    .await?
            }
        };

        debug!(recognizer = %self.name, response_len = response.len(), "応答を受信");
        self.interpret(&response)
    }
}
