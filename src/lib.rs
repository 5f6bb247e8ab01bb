//! Memkeep - plain-text agent memory
//!
//! Keeps an agent's memory as files on local disk:
//! - `MEMORY.md` - curated long-term facts, one bullet per fact
//! - `memory/YYYY-MM-DD.md` - append-only daily notes
//! - `agents/<agent>/sessions/<id>.jsonl` - append-only conversation transcripts,
//!   compacted into summaries when they outgrow their token budget

pub mod config;
pub mod manager;
pub mod memory;
pub mod session;
pub mod summarize;
pub mod tokens;

pub use config::{MemkeepConfig, SummarizerConfig};
pub use manager::MemoryManager;
pub use memory::{DailyLog, FactStore, SectionDocument};
pub use session::{CompactionOutcome, CompactionPolicy, SessionStore, Transcript};
pub use summarize::{LlmSummarizer, Summarizer};
pub use tokens::{ApproxTokenCounter, TokenCounter};

/// Result type for Memkeep operations
pub type Result<T> = std::result::Result<T, MemkeepError>;

/// Errors that can occur in Memkeep
#[derive(Debug, thiserror::Error)]
pub enum MemkeepError {
    #[error("No active session")]
    NoActiveSession,

    #[error("No summarizer configured")]
    NoSummarizer,

    #[error("Summarization error: {0}")]
    Summarizer(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
