//! AI CLI（claude / codex）呼び出し
//!
//! 画像を一時ファイルに書き出し、パスをプロンプトに含めて渡す。

use crate::ai_provider::AiProvider;
use crate::error::{CatalogError, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// 一時画像ファイル。Drop で削除する
struct TempImage {
    path: PathBuf,
}

impl TempImage {
    async fn write(image: &[u8]) -> Result<Self> {
        let dir = std::env::temp_dir().join("card-catalog");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.jpg", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, image).await?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// 画像付きでCLIを実行し、標準出力を返す
pub(super) async fn run_with_image(provider: AiProvider, prompt: &str, image: &[u8]) -> Result<String> {
    if !provider.is_cli() {
        return Err(CatalogError::Config(format!(
            "{} はCLIプロバイダではありません",
            provider
        )));
    }

    let temp = TempImage::write(image).await?;
    let image_path = temp.path().display().to_string().replace('\\', "/");

    let mut command = build_command(provider, prompt, &image_path);
    debug!(provider = %provider, prompt_len = prompt.len(), "CLI呼び出し");

    let output = command.output().await.map_err(|e| {
        CatalogError::CliExecution(format!("{} の起動に失敗: {}", provider.command_name(), e))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CatalogError::ApiCall(format!(
            "{} failed (code {:?}): {}",
            provider.command_name(),
            output.status.code(),
            stderr.trim()
        )));
    }

    let response = String::from_utf8_lossy(&output.stdout).to_string();
    debug!(provider = %provider, response_len = response.len(), "CLI応答");
    Ok(response)
}

fn build_command(provider: AiProvider, prompt: &str, image_path: &str) -> Command {
    let program = provider.command_name();

    // Windowsではcmd /c経由
    #[cfg(windows)]
    let mut command = {
        let mut c = Command::new("cmd");
        c.args(["/c", program]);
        c
    };
    #[cfg(not(windows))]
    let mut command = Command::new(program);

    match provider {
        AiProvider::Codex => {
            command.args(["exec", "--image", image_path, prompt]);
        }
        _ => {
            let full_prompt = format!(
                "Read the following image file and analyze it: {}\n\n{}",
                image_path, prompt
            );
            command.args(["-p", &full_prompt, "--output-format", "text"]);
        }
    }
    command.kill_on_drop(true);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[cfg(not(windows))]
    #[test]
    fn test_claude_command_embeds_image_path() {
        let command = build_command(AiProvider::Claude, "identify", "/tmp/x.jpg");
        let args = args_of(&command);
        assert_eq!(args[0], "-p");
        assert!(args[1].contains("/tmp/x.jpg"));
        assert!(args[1].ends_with("identify"));
        assert_eq!(&args[2..], ["--output-format", "text"]);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_codex_command_passes_image_flag() {
        let command = build_command(AiProvider::Codex, "read text", "/tmp/y.jpg");
        assert_eq!(
            args_of(&command),
            ["exec", "--image", "/tmp/y.jpg", "read text"]
        );
    }

    #[tokio::test]
    async fn test_gemini_is_not_a_cli_provider() {
        let result = run_with_image(AiProvider::Gemini, "x", b"img").await;
        assert!(matches!(result, Err(CatalogError::Config(_))));
    }

    #[tokio::test]
    async fn test_temp_image_removed_on_drop() {
        let temp = TempImage::write(b"bytes").await.unwrap();
        let path = temp.path().to_path_buf();
        assert!(path.exists());
        drop(temp);
        assert!(!path.exists());
    }
}
