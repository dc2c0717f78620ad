use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::state::{DEFAULT_PARTS_PER_CHAPTER, DEFAULT_TOTAL_CHAPTERS};
use crate::services::generator::GenerationSettings;
use crate::services::llm::LlmConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_novels")]
    pub novels_folder: String,

    #[serde(default = "default_sessions")]
    pub sessions_folder: String,

    #[serde(default = "default_poll_delay")]
    pub poll_delay_seconds: u64,

    #[serde(default)]
    pub unattended: bool,

    #[serde(default)]
    pub novel: NovelConfig,

    pub llm: LlmConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NovelConfig {
    #[serde(default = "default_total_chapters")]
    pub total_chapters: u32,
    #[serde(default = "default_parts_per_chapter")]
    pub parts_per_chapter: u32,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub max_tokens: TokenLimits,
}

impl NovelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.total_chapters == 0 {
            bail!("novel.total_chapters must be at least 1");
        }
        if self.parts_per_chapter == 0 {
            bail!("novel.parts_per_chapter must be at least 1");
        }
        Ok(())
    }
}

impl Default for NovelConfig {
    fn default() -> Self {
        Self {
            total_chapters: default_total_chapters(),
            parts_per_chapter: default_parts_per_chapter(),
            language: default_language(),
            max_tokens: TokenLimits::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimits {
    #[serde(default = "default_max_tokens")]
    pub summary: u32,
    #[serde(default = "default_max_tokens")]
    pub chapter_title: u32,
    #[serde(default = "default_max_tokens")]
    pub part: u32,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            summary: default_max_tokens(),
            chapter_title: default_max_tokens(),
            part: default_max_tokens(),
        }
    }
}

fn default_novels() -> String {
    "novels".to_string()
}
fn default_sessions() -> String {
    "sessions".to_string()
}
fn default_poll_delay() -> u64 {
    2
}
fn default_total_chapters() -> u32 {
    DEFAULT_TOTAL_CHAPTERS
}
fn default_parts_per_chapter() -> u32 {
    DEFAULT_PARTS_PER_CHAPTER
}
fn default_language() -> String {
    "French".to_string()
}
fn default_max_tokens() -> u32 {
    200
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.yml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(content)?;
        config.novel.validate()?;
        Ok(config)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.novels_folder)?;
        fs::create_dir_all(&self.sessions_folder)?;
        Ok(())
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            language: self.novel.language.clone(),
            max_tokens: self.novel.max_tokens,
            call_timeout: Duration::from_secs(self.llm.timeout_seconds),
        }
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_seconds)
    }
}
