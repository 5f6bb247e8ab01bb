//! Memkeep configuration.
//!
//! Settings come from an optional TOML file, then environment overrides:
//!
//! ```toml
//! root = "/home/me/.memkeep"
//! agent_id = "main"
//!
//! [compaction]
//! context_window = 128000
//! keep_recent_tokens = 20000
//!
//! [summarizer]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//! ```

use crate::session::CompactionSettings;
use crate::{MemkeepError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_AGENT_ID: &str = "main";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Where summarization requests go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

/// Shape of the config file; every field is optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    root: Option<PathBuf>,
    agent_id: Option<String>,
    compaction: Option<CompactionSettings>,
    summarizer: Option<SummarizerConfig>,
}

/// Configuration for Memkeep
#[derive(Debug, Clone)]
pub struct MemkeepConfig {
    /// Storage root holding `MEMORY.md`, `memory/` and `agents/`
    pub root: PathBuf,

    /// Agent whose sessions are managed
    pub agent_id: String,

    /// Compaction token budgets
    pub compaction: CompactionSettings,

    /// Summarizer endpoint; compaction is unavailable without one
    pub summarizer: Option<SummarizerConfig>,
}

impl MemkeepConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            agent_id: DEFAULT_AGENT_ID.to_string(),
            compaction: CompactionSettings::default(),
            summarizer: None,
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionSettings) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn with_summarizer(mut self, summarizer: SummarizerConfig) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Load `path` if it exists, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<ConfigToml>(&content)?
            }
            _ => ConfigToml::default(),
        };

        let root = match file.root {
            Some(root) => root,
            None => default_root()?,
        };
        let mut config = Self::new(root);
        if let Some(agent_id) = file.agent_id {
            config.agent_id = agent_id;
        }
        if let Some(compaction) = file.compaction {
            config.compaction = compaction;
        }
        config.summarizer = file.summarizer;

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `MEMKEEP_*` overrides looked up through `var`.
    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = var("MEMKEEP_ROOT") {
            self.root = PathBuf::from(root);
        }
        if let Some(agent_id) = var("MEMKEEP_AGENT") {
            self.agent_id = agent_id;
        }
        let model = var("MEMKEEP_MODEL");
        let base_url = var("MEMKEEP_BASE_URL");
        if model.is_some() || base_url.is_some() {
            let summarizer = self.summarizer.get_or_insert_with(SummarizerConfig::default);
            if let Some(model) = model {
                summarizer.model = model;
            }
            if let Some(base_url) = base_url {
                summarizer.base_url = base_url;
            }
        }
    }

    pub fn long_term_path(&self) -> PathBuf {
        self.root.join("MEMORY.md")
    }

    pub fn daily_dir(&self) -> PathBuf {
        self.root.join("memory")
    }
}

/// `~/.memkeep`
pub fn default_root() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MemkeepError::Config("could not find home directory".to_string()))?;
    Ok(home.join(".memkeep"))
}
