//! Card Catalog Common Library
//!
//! 認識結果の型・信頼度ポリシー・レスポンスパーサー・カタログ検索ロジック

pub mod types;
pub mod confidence;
pub mod review;
pub mod alias;
pub mod error;
pub mod parser;
pub mod prompts;
pub mod ocr;
pub mod catalog;
pub mod trends;

pub use types::{
    CardField, CardFields, FieldConfidence, RecognitionAttempt, RecognitionMethod,
    ReconciledResult, StageMethod,
};
pub use confidence::{
    format_percent, is_uncertain, is_uncertain_with, tier_of, ConfidenceTier, FieldWeights,
};
pub use review::{FieldReview, RecognitionReview, ReviewNotice};
pub use alias::{build_aliases, AliasConfig};
pub use error::{Error, Result};
pub use parser::{extract_json, parse_identification_response, parse_ocr_response};
pub use prompts::{build_identification_prompt, build_ocr_prompt};
pub use ocr::extract_fields_from_text;
pub use catalog::{
    BulkImportCard, BulkImportResult, CardDraft, CardFilters, CardId, CardMetadata, ImageRef,
    PaginatedResult, PricePoint, UserProfile, UserRole,
};
pub use trends::{page_value, value_trends, ValueTrend};
