//! Per-agent session index.
//!
//! Directory layout:
//!   {root}/agents/{agent_id}/sessions.json
//!   {root}/agents/{agent_id}/sessions/{session_id}.jsonl
//!
//! `sessions.json` caches totals for each session. The transcript files are
//! the source of truth; the index is refreshed from them via [`SessionStore::sync`].

use super::transcript::Transcript;
use crate::tokens::TokenCounter;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cached metadata for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub token_count: usize,
    #[serde(default)]
    pub entry_count: usize,
    #[serde(default)]
    pub compaction_count: usize,
}

/// Manages one agent's session index and transcript files.
#[derive(Debug, Clone)]
pub struct SessionStore {
    agent_id: String,
    agent_dir: PathBuf,
}

impl SessionStore {
    pub fn new(root: &Path, agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_dir: root.join("agents").join(sanitize(agent_id)),
        }
    }

    /// Create the sessions directory if needed.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.sessions_dir()).await?;
        Ok(())
    }

    /// Register a new session and create its empty transcript file.
    pub async fn create_session(&self) -> Result<SessionMeta> {
        self.init().await?;
        let now = Utc::now();
        let meta = SessionMeta {
            id: Uuid::new_v4().to_string(),
            agent_id: self.agent_id.clone(),
            created_at: now,
            updated_at: now,
            token_count: 0,
            entry_count: 0,
            compaction_count: 0,
        };
        fs::File::create(self.transcript_path(&meta.id)).await?;

        let mut index = self.load_index().await?;
        index.push(meta.clone());
        self.save_index(&index).await?;

        info!("Created session {} for agent {}", meta.id, self.agent_id);
        Ok(meta)
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<SessionMeta>> {
        let index = self.load_index().await?;
        Ok(index.into_iter().find(|meta| meta.id == session_id))
    }

    /// All sessions, most recently updated first.
    pub async fn list(&self) -> Result<Vec<SessionMeta>> {
        let mut index = self.load_index().await?;
        index.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(index)
    }

    pub async fn latest(&self) -> Result<Option<SessionMeta>> {
        Ok(self.list().await?.into_iter().next())
    }

    /// Open and load the transcript of a session.
    pub async fn open_transcript(
        &self,
        session_id: &str,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Transcript> {
        let mut transcript = Transcript::new(self.transcript_path(session_id), counter);
        transcript.init().await?;
        Ok(transcript)
    }

    /// Refresh the cached totals of `session_id` from its transcript.
    ///
    /// Returns the updated metadata, or `None` if the session is not indexed.
    pub async fn sync(
        &self,
        session_id: &str,
        transcript: &Transcript,
    ) -> Result<Option<SessionMeta>> {
        let mut index = self.load_index().await?;
        let Some(meta) = index.iter_mut().find(|meta| meta.id == session_id) else {
            return Ok(None);
        };
        meta.updated_at = Utc::now();
        meta.token_count = transcript.total_tokens();
        meta.entry_count = transcript.len();
        meta.compaction_count = transcript.compaction_count();
        let updated = meta.clone();

        self.save_index(&index).await?;
        Ok(Some(updated))
    }

    /// Drop a session from the index and delete its transcript.
    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        let mut index = self.load_index().await?;
        let before = index.len();
        index.retain(|meta| meta.id != session_id);
        if index.len() == before {
            return Ok(false);
        }
        self.save_index(&index).await?;

        let path = self.transcript_path(session_id);
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        info!("Deleted session {}", session_id);
        Ok(true)
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn index_path(&self) -> PathBuf {
        self.agent_dir.join("sessions.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.agent_dir.join("sessions")
    }

    pub fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("{}.jsonl", sanitize(session_id)))
    }

    /// Missing or unreadable index files read as empty.
    async fn load_index(&self) -> Result<Vec<SessionMeta>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).await?;
        match serde_json::from_str::<Vec<SessionMeta>>(&content) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!("Failed to parse session index {:?}: {}", path, e);
                Ok(Vec::new())
            }
        }
    }

    async fn save_index(&self, index: &[SessionMeta]) -> Result<()> {
        fs::create_dir_all(&self.agent_dir).await?;
        let content = serde_json::to_string_pretty(index)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.index_path())
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        debug!("Saved session index for agent {}", self.agent_id);
        Ok(())
    }
}

/// Make an id safe to use as a file name.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
