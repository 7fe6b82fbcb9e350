use card_catalog::catalog::{
    CatalogStore, ImageStore, JsonCatalogStore, LocalImageStore, ProgressFn,
};
use card_catalog::recognizer::cache::{
    recognize_with_cache, settings_fingerprint, RecognitionCache,
};
use card_catalog::{cli, config, error, export, recognizer, scanner};
use card_catalog_common::trends::DEFAULT_TREND_LIMIT;
use card_catalog_common::{
    format_percent, value_trends, BulkImportCard, CardFilters, CardMetadata, ReconciledResult,
};
use chrono::Datelike;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use error::{CatalogError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: u64, template: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

/// Ctrl+C でキャンセルされるトークン
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

fn print_result(file_name: &str, result: &ReconciledResult) {
    let review = result.review();
    match review.tier {
        Some(tier) => println!(
            "■ {} [{} / {} {}]",
            file_name,
            result.method(),
            tier,
            format_percent(result.overall_confidence())
        ),
        None => println!("■ {} [{}]", file_name, result.method()),
    }

    for field in &review.fields {
        println!(
            "  {:<11} {:<24} {:>4}{}",
            field.field.to_string(),
            field.value,
            format_percent(field.confidence),
            if field.uncertain { "  ⚠ 要確認" } else { "" }
        );
    }
    if let Some(error) = result.error() {
        println!("  エラー: {}", error);
    }
    println!("  → {}", review.notice);
}

fn print_card(card: &CardMetadata) {
    let d = &card.draft;
    println!("ID: {}", card.id);
    println!("  選手名:   {}", d.player_name);
    println!("  年:       {}", d.year);
    println!("  ブランド: {}", d.brand);
    if let Some(series) = &d.card_series {
        println!("  シリーズ: {}", series);
    }
    if !d.team.is_empty() {
        println!("  チーム:   {}", d.team);
    }
    if let Some(number) = &d.card_number {
        println!("  番号:     {}", number);
    }
    if let Some(serial) = &d.serial_number {
        println!("  シリアル: {}", serial);
    }
    println!(
        "  区分:     {}{}",
        if d.is_rookie_card { "RC " } else { "" },
        if d.is_autographed { "AUTO" } else { "" }
    );
    if let Some(price) = card.average_price {
        println!("  平均価格: {:.2}", price);
    }
    if let Some(confidence) = d.recognition_confidence {
        println!("  認識信頼度: {}", format_percent(confidence));
    }
    if !d.image.url.is_empty() {
        println!("  画像:     {}", d.image.url);
    }
    if let Some(notes) = &d.notes {
        println!("  メモ:     {}", notes);
    }
    println!("  登録日時: {}", card.timestamp.format("%Y-%m-%d %H:%M"));
}

fn print_card_line(card: &CardMetadata) {
    let d = &card.draft;
    println!(
        "{}  {} {} {}{}{}",
        card.id,
        d.year,
        d.brand,
        d.player_name,
        d.card_series.as_deref().map(|s| format!(" ({})", s)).unwrap_or_default(),
        card.average_price.map(|p| format!("  {:.2}", p)).unwrap_or_default()
    );
}

/// 認識対象の画像一覧とキャッシュ保存先
fn collect_images(path: &Path, recursive: bool) -> Result<(Vec<scanner::ImageInfo>, PathBuf)> {
    if path.is_dir() {
        let images = scanner::scan_folder(path, recursive)?;
        if images.is_empty() {
            return Err(CatalogError::NoImagesFound(path.display().to_string()));
        }
        return Ok((images, path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(CatalogError::FileNotFound(path.display().to_string()));
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let folder = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok((
        vec![scanner::ImageInfo {
            path: path.to_path_buf(),
            file_name,
        }],
        folder,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load()?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = Some(dir);
    }

    match cli.command {
        Commands::Recognize { path, json, use_cache, recursive } => {
            let (images, cache_folder) = collect_images(&path, recursive)?;
            let orchestrator = recognizer::build_orchestrator(&config)?;
            let cancel = cancel_on_ctrl_c();
            let mut cache = if use_cache {
                RecognitionCache::load_matching(&cache_folder, &settings_fingerprint(&config))
            } else {
                RecognitionCache::default()
            };

            if !json {
                println!("🃏 card-catalog - カード認識\n");
                println!(
                    "{}枚の画像を認識中...{}",
                    images.len(),
                    if use_cache { " (キャッシュ有効)" } else { "" }
                );
            }

            let bar = if json {
                ProgressBar::hidden()
            } else {
                progress_bar(images.len() as u64, "{bar:30.cyan/blue} {pos}/{len} {msg}")
            };

            let mut outputs = Vec::new();
            for image in &images {
                if cancel.is_cancelled() {
                    break;
                }
                bar.set_message(image.file_name.clone());
                let bytes = tokio::fs::read(&image.path).await?;
                let result = if use_cache {
                    recognize_with_cache(&orchestrator, &mut cache, &image.file_name, &bytes, &cancel)
                        .await
                } else {
                    orchestrator.recognize_card_with_cancel(&bytes, &cancel).await
                };
                bar.inc(1);
                outputs.push((image.file_name.clone(), result));
            }
            bar.finish_and_clear();

            if use_cache {
                cache.save(&cache_folder)?;
            }

            if json {
                let values: Vec<serde_json::Value> = outputs
                    .iter()
                    .map(|(file_name, result)| {
                        serde_json::json!({
                            "fileName": file_name,
                            "result": result,
                            "review": result.review(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                for (file_name, result) in &outputs {
                    print_result(file_name, result);
                }
                let recognized = outputs.iter().filter(|(_, r)| r.success()).count();
                println!("\n✅ 認識完了 ({}/{}件)", recognized, outputs.len());
            }
        }

        Commands::Add { image, fields, no_recognize } => {
            println!("🃏 card-catalog - カード登録\n");
            if !image.is_file() {
                return Err(CatalogError::FileNotFound(image.display().to_string()));
            }
            let bytes = tokio::fs::read(&image).await?;

            let recognized = if no_recognize {
                None
            } else {
                println!("[1/3] カードを認識中...");
                let orchestrator = recognizer::build_orchestrator(&config)?;
                let result = orchestrator
                    .recognize_card_with_cancel(&bytes, &cancel_on_ctrl_c())
                    .await;
                let name = image
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                print_result(&name, &result);
                println!();
                Some(result)
            };

            let data_dir = config.data_dir()?;
            let store = JsonCatalogStore::open_in(&data_dir).await?;
            let mut draft = fields.to_draft(recognized.as_ref());
            // 検証を画像保存より先に行う
            draft = draft.validate(chrono::Utc::now().year() as u32)?;

            println!("[2/3] 画像を保存中...");
            let images = LocalImageStore::new(data_dir.join("images"));
            let bar = progress_bar(100, "{bar:30.green/white} {pos}%");
            let report: ProgressFn<'_> = &|p: u8| bar.set_position(p as u64);
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "card.jpg".into());
            draft.image = images.store(&bytes, &file_name, Some(report)).await?;
            bar.finish_and_clear();

            println!("[3/3] カタログに登録中...");
            let card = store.add_card(None, draft).await?;
            println!();
            print_card(&card);
            println!("\n✅ 登録完了");
        }

        Commands::Search {
            term,
            team,
            year,
            brand,
            series,
            player,
            rookie,
            autographed,
            page,
            page_size,
        } => {
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            let filters = CardFilters {
                team,
                year,
                brand,
                card_series: series,
                player_name: player,
                is_rookie_card: rookie.then_some(true),
                is_autographed: autographed.then_some(true),
            };
            let page_size = page_size.max(1);
            let offset = page.saturating_sub(1) * page_size;
            let result = store
                .search_cards(&filters, term.as_deref(), page_size, offset)
                .await?;

            for card in &result.cards {
                print_card_line(card);
            }
            println!(
                "\n{}件中 {}-{}件目{}",
                result.total,
                if result.cards.is_empty() { 0 } else { offset + 1 },
                offset + result.cards.len(),
                if result.has_more { format!("（次: --page {}）", page.max(1) + 1) } else { String::new() }
            );
        }

        Commands::Show { id } => {
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            print_card(&store.get_card(&id).await?);
        }

        Commands::Edit { id, fields } => {
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            let mut draft = store.get_card(&id).await?.draft;
            fields.apply_to(&mut draft);
            let card = store.update_card(&id, draft).await?;
            print_card(&card);
            println!("\n✅ 更新完了");
        }

        Commands::Delete { id, yes } => {
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            let card = store.get_card(&id).await?;
            print_card_line(&card);

            let confirmed = yes
                || dialoguer::Confirm::new()
                    .with_prompt("このカードを削除しますか？")
                    .default(false)
                    .interact()
                    .map_err(|e| CatalogError::Config(format!("入力エラー: {}", e)))?;
            if confirmed {
                store.delete_card(&id).await?;
                println!("✔ 削除しました");
            } else {
                println!("キャンセルしました");
            }
        }

        Commands::Import { input } => {
            println!("📥 card-catalog - 一括インポート\n");
            let content = tokio::fs::read_to_string(&input).await?;
            let cards: Vec<BulkImportCard> = serde_json::from_str(&content)?;
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            let result = store.bulk_import(cards).await?;

            println!("  新規: {}件", result.created);
            println!("  更新: {}件", result.updated);
            println!("  失敗: {}件", result.failed);
            for (id, message) in &result.errors {
                println!("    - {}: {}", id, message);
            }
            println!("\n✅ インポート完了");
        }

        Commands::Price { id, amount } => {
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            let card = store.record_price(&id, amount).await?;
            match amount {
                Some(p) => println!("✔ 価格を記録: {} → {:.2}", card.draft.player_name, p),
                None => println!("✔ 価格取得不可として記録: {}", card.draft.player_name),
            }
        }

        Commands::History { id } => {
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            let history = store.price_history(&id).await?;
            if history.is_empty() {
                println!("価格履歴がありません");
            }
            for point in history {
                let price = point
                    .price
                    .map(|p| format!("{:.2}", p))
                    .unwrap_or_else(|| "-".into());
                println!("{}  {}", point.timestamp.format("%Y-%m-%d %H:%M"), price);
            }
        }

        Commands::Recent { limit } => {
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            for card in store.recently_changed(limit).await? {
                print_card_line(&card);
            }
        }

        Commands::Trends { limit } => {
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            let cards = store.get_all_cards().await?;
            let limit = if limit == 0 { DEFAULT_TREND_LIMIT } else { limit };
            let trends = value_trends(&cards, limit);
            if trends.is_empty() {
                println!("価格変動のあるカードがありません");
            }
            for trend in trends {
                println!(
                    "{:+7.1}%  {:.2} → {:.2}  {} {} {}",
                    trend.percent_change,
                    trend.previous,
                    trend.latest,
                    trend.year,
                    trend.brand,
                    trend.player_name
                );
            }
        }

        Commands::Export { output } => {
            println!("📄 card-catalog - エクスポート\n");
            let store = JsonCatalogStore::open_in(&config.data_dir()?).await?;
            let cards = store.get_all_cards().await?;
            let output = output.unwrap_or_else(|| PathBuf::from("."));
            export::export_catalog(&cards, &output)?;
            println!("\n✅ エクスポート完了");
        }

        Commands::Config { set_gemini_key, show } => {
            if let Some(key) = set_gemini_key {
                config.set_gemini_api_key(key)?;
                println!("✔ Gemini APIキーを設定しました");
            }

            if show {
                println!("設定: {}", Config::config_path()?.display());
                println!("  primary: {}", config.primary_provider);
                println!("  fallback: {}", config.fallback_provider);
                println!("  Geminiモデル: {}", config.gemini_model);
                println!("  最大画像サイズ: {}px", config.max_image_size);
                println!("  ステージタイムアウト: {}秒", config.stage_timeout_seconds);
                println!("  データフォルダ: {}", config.data_dir()?.display());
                println!(
                    "  Gemini APIキー: {}",
                    if config.get_gemini_api_key().is_ok() { "設定済み" } else { "未設定" }
                );
            }
        }

        Commands::Cache { clear, folder, info } => {
            let target = folder.unwrap_or_else(|| PathBuf::from("."));
            let cache_path = RecognitionCache::cache_path(&target);

            if info || !clear {
                if cache_path.exists() {
                    let cache = RecognitionCache::load(&target);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  件数: {}", cache.len());
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                let existed = cache_path.exists();
                RecognitionCache::load(&target).clear(&target)?;
                if existed {
                    println!("✔ キャッシュを削除しました: {}", cache_path.display());
                } else {
                    println!("キャッシュファイルが存在しません");
                }
            }
        }
    }

    Ok(())
}
