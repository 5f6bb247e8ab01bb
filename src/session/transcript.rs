//! Append-only JSONL conversation transcript.
//!
//! Each line of the file is one [`TranscriptEntry`]. Entries are never
//! rewritten: compaction appends a `compaction` entry and everything before
//! the last such entry drops out of the "recent" view while staying on disk.

use crate::tokens::TokenCounter;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix marking a compaction summary in rebuilt conversation history.
pub const SUMMARY_PREFIX: &str = "[Summary of the earlier conversation]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Message,
    ToolCall,
    ToolResult,
    Compaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One line of a transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub id: String,
    /// Previous entry in the thread. Kept as data; readers treat the
    /// transcript as a flat sequence.
    pub parent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub content: String,
    #[serde(default)]
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// An entry before it gets an id, timestamp and token count.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub parent_id: Option<String>,
    pub kind: EntryKind,
    pub role: Option<Role>,
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
}

/// Role/content pair handed to a language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

/// A single conversation's transcript file plus its in-memory copy.
pub struct Transcript {
    file_path: PathBuf,
    entries: Vec<TranscriptEntry>,
    /// Sum of token counts over every entry, archived ones included
    total_tokens: usize,
    loaded: bool,
    counter: Arc<dyn TokenCounter>,
}

impl Transcript {
    pub fn new(file_path: PathBuf, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            file_path,
            entries: Vec::new(),
            total_tokens: 0,
            loaded: false,
            counter,
        }
    }

    /// Create the file (and its directory) if absent, then load it.
    pub async fn init(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            if let Some(parent) = self.file_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::File::create(&self.file_path).await?;
        }
        self.load().await
    }

    /// Read the file once. Lines that fail to parse are skipped.
    pub async fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.entries.clear();
        self.total_tokens = 0;

        if self.file_path.exists() {
            let content = fs::read_to_string(&self.file_path).await?;
            for (index, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<TranscriptEntry>(line) {
                    Ok(entry) => {
                        self.total_tokens += entry.token_count;
                        self.entries.push(entry);
                    }
                    Err(e) => warn!(
                        "Skipping malformed line {} in {:?}: {}",
                        index + 1,
                        self.file_path,
                        e
                    ),
                }
            }
        }

        self.loaded = true;
        debug!(
            "Loaded {} transcript entries from {:?}",
            self.entries.len(),
            self.file_path
        );
        Ok(())
    }

    /// Discard in-memory state and read the file again.
    pub async fn reload(&mut self) -> Result<()> {
        self.loaded = false;
        self.load().await
    }

    /// Stamp `new` with an id, timestamp and token count and append it as one line.
    pub async fn append(&mut self, new: NewEntry) -> Result<TranscriptEntry> {
        self.load().await?;

        let entry = TranscriptEntry {
            id: Uuid::new_v4().to_string(),
            parent_id: new.parent_id,
            timestamp: Utc::now(),
            kind: new.kind,
            role: new.role,
            token_count: self.counter.count_tokens(&new.content),
            content: new.content,
            metadata: new.metadata,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.total_tokens += entry.token_count;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Append a user message. `parent_id` defaults to the last entry.
    pub async fn add_user_message(
        &mut self,
        content: &str,
        parent_id: Option<String>,
    ) -> Result<TranscriptEntry> {
        self.add_message(Role::User, content, parent_id).await
    }

    /// Append an assistant message. `parent_id` defaults to the last entry.
    pub async fn add_assistant_message(
        &mut self,
        content: &str,
        parent_id: Option<String>,
    ) -> Result<TranscriptEntry> {
        self.add_message(Role::Assistant, content, parent_id).await
    }

    pub async fn add_tool_call(
        &mut self,
        tool_name: &str,
        arguments: &Value,
        parent_id: Option<String>,
    ) -> Result<TranscriptEntry> {
        self.load().await?;
        let mut metadata = Map::new();
        metadata.insert("toolName".to_string(), json!(tool_name));
        metadata.insert("arguments".to_string(), arguments.clone());

        let parent_id = parent_id.or_else(|| self.last_id());
        self.append(NewEntry {
            parent_id,
            kind: EntryKind::ToolCall,
            role: None,
            content: format!("{}({})", tool_name, arguments),
            metadata: Some(metadata),
        })
        .await
    }

    pub async fn add_tool_result(
        &mut self,
        tool_name: &str,
        output: &str,
        parent_id: Option<String>,
    ) -> Result<TranscriptEntry> {
        self.load().await?;
        let mut metadata = Map::new();
        metadata.insert("toolName".to_string(), json!(tool_name));

        let parent_id = parent_id.or_else(|| self.last_id());
        self.append(NewEntry {
            parent_id,
            kind: EntryKind::ToolResult,
            role: None,
            content: output.to_string(),
            metadata: Some(metadata),
        })
        .await
    }

    /// Append a compaction boundary recording which entries it replaces.
    pub async fn add_compaction(
        &mut self,
        summary: &str,
        removed_ids: &[String],
    ) -> Result<TranscriptEntry> {
        let mut metadata = Map::new();
        metadata.insert("removedEntryIds".to_string(), json!(removed_ids));
        metadata.insert("removedCount".to_string(), json!(removed_ids.len()));

        self.append(NewEntry {
            parent_id: None,
            kind: EntryKind::Compaction,
            role: None,
            content: summary.to_string(),
            metadata: Some(metadata),
        })
        .await
    }

    /// Entries from the last compaction boundary (inclusive) to the end.
    ///
    /// Empty until the transcript has been loaded.
    pub fn recent_entries(&self) -> &[TranscriptEntry] {
        let start = self
            .entries
            .iter()
            .rposition(|entry| entry.kind == EntryKind::Compaction)
            .unwrap_or(0);
        &self.entries[start..]
    }

    pub fn recent_tokens(&self) -> usize {
        self.recent_entries().iter().map(|e| e.token_count).sum()
    }

    /// Tokens over every entry ever appended, including archived ones.
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Recent entries as role/content messages.
    ///
    /// A compaction entry becomes an assistant message prefixed with
    /// [`SUMMARY_PREFIX`]. Tool calls and results are left out.
    pub fn build_conversation_history(&self) -> Vec<HistoryMessage> {
        self.recent_entries()
            .iter()
            .filter_map(|entry| match entry.kind {
                EntryKind::Message => Some(HistoryMessage {
                    role: entry.role.unwrap_or(Role::User),
                    content: entry.content.clone(),
                }),
                EntryKind::Compaction => Some(HistoryMessage {
                    role: Role::Assistant,
                    content: format!("{}\n{}", SUMMARY_PREFIX, entry.content),
                }),
                EntryKind::ToolCall | EntryKind::ToolResult => None,
            })
            .collect()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_id(&self) -> Option<String> {
        self.entries.last().map(|entry| entry.id.clone())
    }

    pub fn compaction_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::Compaction)
            .count()
    }

    /// Token counter this transcript stamps entries with.
    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    async fn add_message(
        &mut self,
        role: Role,
        content: &str,
        parent_id: Option<String>,
    ) -> Result<TranscriptEntry> {
        self.load().await?;
        let parent_id = parent_id.or_else(|| self.last_id());
        self.append(NewEntry {
            parent_id,
            kind: EntryKind::Message,
            role: Some(role),
            content: content.to_string(),
            metadata: None,
        })
        .await
    }
}
