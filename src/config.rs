//! TOML configuration.
//!
//! The whole process reads its settings once, at entry, through
//! [`load_config`]. Every section has defaults, so an empty file is a valid
//! configuration. The OpenAI credential is resolved here too: if
//! `[openai].api_key` is absent it is taken from `OPENAI_API_KEY`. Nothing
//! below this module reads the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::search::SearchMode;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub loader: LoaderConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub eval: EvalConfig,
    pub openai: OpenAIConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub raw_dir: Option<PathBuf>,
    pub processed_dir: Option<PathBuf>,
    pub index_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            raw_dir: None,
            processed_dir: None,
            index_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn raw_dir(&self) -> PathBuf {
        self.raw_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("raw"))
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.processed_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("processed"))
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("index"))
    }

    pub fn preview_path(&self) -> PathBuf {
        self.processed_dir().join("chunks_preview.txt")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoaderConfig {
    pub include_globs: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            include_globs: vec!["*.pdf".to_string(), "*.PDF".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_length: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_length: 1200,
            overlap: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub url: Option<String>,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            url: None,
            batch_size: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.1,
            url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub mode: SearchMode,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            mode: SearchMode::Similarity,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvalConfig {
    pub dir: PathBuf,
    pub questions: Option<PathBuf>,
    pub k: usize,
    pub temperature: f32,
    pub mode: SearchMode,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./eval"),
            questions: None,
            k: 4,
            temperature: 0.1,
            mode: SearchMode::Diverse,
        }
    }
}

impl EvalConfig {
    pub fn questions_path(&self) -> PathBuf {
        self.questions
            .clone()
            .unwrap_or_else(|| self.dir.join("preguntas.csv"))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenAIConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl OpenAIConfig {
    /// The configured key, if present and not blank.
    pub fn key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.openai.key().is_none() {
        config.openai.api_key = std::env::var("OPENAI_API_KEY").ok();
    }

    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints. Called by [`load_config`]; exposed for
/// configs built in code.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_length == 0 {
        anyhow::bail!("chunking.max_length must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_length {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.max_length ({})",
            config.chunking.overlap,
            config.chunking.max_length
        );
    }

    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.eval.k < 1 {
        anyhow::bail!("eval.k must be >= 1");
    }

    for (name, t) in [
        ("llm.temperature", config.llm.temperature),
        ("eval.temperature", config.eval.temperature),
    ] {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("{} must be in [0.0, 2.0]", name);
        }
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    for (section, provider) in [
        ("embedding", config.embedding.provider.as_str()),
        ("llm", config.llm.provider.as_str()),
    ] {
        match provider {
            "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown {} provider: '{}'. Must be openai or ollama.",
                section,
                other
            ),
        }
    }

    if config.loader.include_globs.is_empty() {
        anyhow::bail!("loader.include_globs must not be empty");
    }

    Ok(())
}
