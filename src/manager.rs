//! One storage root's memory, wired together.
//!
//! `MemoryManager` owns the fact store, the daily log and the agent's
//! session index, tracks the active session, and keeps `sessions.json` in
//! step with every transcript mutation it performs.

use crate::config::MemkeepConfig;
use crate::memory::{ContextBuilder, DailyLog, FactStore};
use crate::memory::daily::SESSION_NOTES;
use crate::session::{
    CompactionOutcome, CompactionPolicy, SessionMeta, SessionStore, Transcript, TranscriptEntry,
};
use crate::summarize::Summarizer;
use crate::tokens::TokenCounter;
use crate::{MemkeepError, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// The session currently receiving messages.
struct ActiveSession {
    meta: SessionMeta,
    transcript: Transcript,
}

pub struct MemoryManager {
    config: MemkeepConfig,
    facts: FactStore,
    daily: DailyLog,
    sessions: SessionStore,
    policy: CompactionPolicy,
    counter: Arc<dyn TokenCounter>,
    summarizer: Option<Arc<dyn Summarizer>>,
    active: Option<ActiveSession>,
}

impl MemoryManager {
    /// Initialize every store under the configured root.
    pub async fn open(config: MemkeepConfig, counter: Arc<dyn TokenCounter>) -> Result<Self> {
        let mut facts = FactStore::new(config.long_term_path());
        facts.init().await?;
        let daily = DailyLog::new(config.daily_dir());
        daily.init().await?;
        let sessions = SessionStore::new(&config.root, &config.agent_id);
        sessions.init().await?;

        Ok(Self {
            policy: CompactionPolicy::new(config.compaction),
            config,
            facts,
            daily,
            sessions,
            counter,
            summarizer: None,
            active: None,
        })
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn set_summarizer(&mut self, summarizer: Option<Arc<dyn Summarizer>>) {
        self.summarizer = summarizer;
    }

    pub fn config(&self) -> &MemkeepConfig {
        &self.config
    }

    pub fn facts(&mut self) -> &mut FactStore {
        &mut self.facts
    }

    pub fn daily(&self) -> &DailyLog {
        &self.daily
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Start a fresh session and make it active.
    pub async fn start_session(&mut self) -> Result<SessionMeta> {
        let meta = self.sessions.create_session().await?;
        let transcript = self
            .sessions
            .open_transcript(&meta.id, self.counter.clone())
            .await?;
        self.active = Some(ActiveSession {
            meta: meta.clone(),
            transcript,
        });
        Ok(meta)
    }

    /// Make an existing session active. Returns `false` if it is not indexed.
    pub async fn resume_session(&mut self, session_id: &str) -> Result<bool> {
        let Some(meta) = self.sessions.get(session_id).await? else {
            return Ok(false);
        };
        let transcript = self
            .sessions
            .open_transcript(&meta.id, self.counter.clone())
            .await?;
        info!("Resumed session {} ({} entries)", meta.id, transcript.len());
        self.active = Some(ActiveSession { meta, transcript });
        Ok(true)
    }

    pub fn active_session(&self) -> Option<&SessionMeta> {
        self.active.as_ref().map(|active| &active.meta)
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.active.as_ref().map(|active| &active.transcript)
    }

    pub async fn add_user_message(&mut self, content: &str) -> Result<TranscriptEntry> {
        let entry = self.active_mut()?.transcript.add_user_message(content, None).await?;
        self.sync_active().await?;
        Ok(entry)
    }

    pub async fn add_assistant_message(&mut self, content: &str) -> Result<TranscriptEntry> {
        let entry = self
            .active_mut()?
            .transcript
            .add_assistant_message(content, None)
            .await?;
        self.sync_active().await?;
        Ok(entry)
    }

    pub async fn add_tool_call(
        &mut self,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<TranscriptEntry> {
        let entry = self
            .active_mut()?
            .transcript
            .add_tool_call(tool_name, arguments, None)
            .await?;
        self.sync_active().await?;
        Ok(entry)
    }

    pub async fn add_tool_result(
        &mut self,
        tool_name: &str,
        output: &str,
    ) -> Result<TranscriptEntry> {
        let entry = self
            .active_mut()?
            .transcript
            .add_tool_result(tool_name, output, None)
            .await?;
        self.sync_active().await?;
        Ok(entry)
    }

    /// False when no session is active.
    pub fn needs_memory_flush(&self) -> bool {
        self.transcript()
            .is_some_and(|transcript| self.policy.needs_memory_flush(transcript))
    }

    /// False when no session is active.
    pub fn needs_compaction(&self) -> bool {
        self.transcript()
            .is_some_and(|transcript| self.policy.needs_compaction(transcript))
    }

    /// Write a note into today's `Session Notes` ahead of compaction.
    pub async fn flush_to_daily(&self, note: &str) -> Result<()> {
        self.daily.add_entry(note, SESSION_NOTES).await
    }

    /// Compact the active session's transcript.
    ///
    /// Fails with [`MemkeepError::NoActiveSession`] or
    /// [`MemkeepError::NoSummarizer`] when either is missing.
    pub async fn compact(&mut self) -> Result<CompactionOutcome> {
        let summarizer = self.summarizer.clone();
        let active = self.active.as_mut().ok_or(MemkeepError::NoActiveSession)?;
        let summarizer = summarizer.ok_or(MemkeepError::NoSummarizer)?;

        let outcome = self
            .policy
            .compact(&mut active.transcript, summarizer.as_ref())
            .await?;
        if matches!(outcome, CompactionOutcome::Compacted(_)) {
            self.sync_active().await?;
        }
        Ok(outcome)
    }

    /// Long-term memory plus today's and yesterday's notes.
    pub async fn build_context(&mut self) -> Result<String> {
        ContextBuilder::new(&mut self.facts)
            .with_daily(&self.daily)
            .build()
            .await
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession> {
        self.active.as_mut().ok_or(MemkeepError::NoActiveSession)
    }

    async fn sync_active(&mut self) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if let Some(meta) = self.sessions.sync(&active.meta.id, &active.transcript).await? {
            active.meta = meta;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CompactionSettings;
    use crate::tokens::ApproxTokenCounter;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedSummarizer;

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String> {
            Ok("recap".to_string())
        }
    }

    async fn manager(dir: &TempDir) -> MemoryManager {
        let config = MemkeepConfig::new(dir.path().to_path_buf()).with_compaction(CompactionSettings {
            context_window: 40,
            reserve_tokens: 10,
            soft_threshold_tokens: 10,
            keep_recent_tokens: 4,
        });
        MemoryManager::open(config, Arc::new(ApproxTokenCounter)).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_lays_out_root() {
        let dir = TempDir::new().unwrap();
        let _manager = manager(&dir).await;
        assert!(dir.path().join("MEMORY.md").exists());
        assert!(dir.path().join("memory").is_dir());
        assert!(dir.path().join("agents/main/sessions").is_dir());
    }

    #[tokio::test]
    async fn test_messages_require_active_session() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir).await;
        assert!(matches!(
            manager.add_user_message("hi").await,
            Err(MemkeepError::NoActiveSession)
        ));
        assert!(!manager.needs_compaction());
    }

    #[tokio::test]
    async fn test_compact_preconditions() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir).await;

        assert!(matches!(manager.compact().await, Err(MemkeepError::NoActiveSession)));
        manager.start_session().await.unwrap();
        assert!(matches!(manager.compact().await, Err(MemkeepError::NoSummarizer)));
    }

    #[tokio::test]
    async fn test_session_metadata_tracks_transcript() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir).await.with_summarizer(Arc::new(FixedSummarizer));
        let meta = manager.start_session().await.unwrap();

        for i in 0..6 {
            manager
                .add_user_message(&format!("message {} with some padding text", i))
                .await
                .unwrap();
        }
        let synced = manager.sessions().get(&meta.id).await.unwrap().unwrap();
        assert_eq!(synced.entry_count, 6);
        assert_eq!(synced.token_count, manager.transcript().unwrap().total_tokens());
        assert!(manager.needs_memory_flush());
        assert!(manager.needs_compaction());

        let outcome = manager.compact().await.unwrap();
        assert!(matches!(outcome, CompactionOutcome::Compacted(_)));
        let synced = manager.sessions().get(&meta.id).await.unwrap().unwrap();
        assert_eq!(synced.compaction_count, 1);
        assert_eq!(synced.entry_count, 7);
        assert_eq!(manager.active_session().unwrap(), &synced);
    }

    #[tokio::test]
    async fn test_resume_session() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir).await;
        let meta = manager.start_session().await.unwrap();
        manager.add_user_message("remember me").await.unwrap();

        let mut other = self::manager(&dir).await;
        assert!(!other.resume_session("missing").await.unwrap());
        let before = other.sessions().get(&meta.id).await.unwrap().unwrap();
        assert!(other.resume_session(&meta.id).await.unwrap());
        assert_eq!(other.sessions().get(&meta.id).await.unwrap().unwrap(), before);
        assert_eq!(other.active_session().unwrap(), &before);
        let history = other.transcript().unwrap().build_conversation_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "remember me");
    }

    #[tokio::test]
    async fn test_flush_and_context() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager(&dir).await;
        manager.facts().add_fact("People", "Dog: Max", true).await.unwrap();
        manager.flush_to_daily("User prefers short answers").await.unwrap();

        let context = manager.build_context().await.unwrap();
        assert!(context.contains("- Dog: Max"));
        assert!(context.contains("User prefers short answers"));
    }
}
