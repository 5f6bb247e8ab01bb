//! Integration tests for Memkeep

use async_trait::async_trait;
use memkeep::memory::daily::DECISIONS_MADE;
use memkeep::session::{CompactionOutcome, EntryKind};
use memkeep::{
    ApproxTokenCounter, CompactionPolicy, DailyLog, FactStore, MemkeepConfig, MemkeepError,
    MemoryManager, SectionDocument, Summarizer, TokenCounter, Transcript,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

struct EchoSummarizer;

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(&self, text: &str) -> memkeep::Result<String> {
        Ok(format!("{} lines summarized", text.lines().filter(|l| !l.is_empty()).count()))
    }
}

/// Empty root, default sections, then a case-insensitive duplicate is refused
#[tokio::test]
async fn test_fact_store_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let mut facts = FactStore::new(temp_dir.path().join("MEMORY.md"));
    facts.init().await.unwrap();

    let text = facts.read().await.unwrap();
    for section in ["Preferences", "People", "Projects", "Facts"] {
        assert_eq!(SectionDocument::get_section(&text, section).as_deref(), Some(""));
    }

    assert!(facts.add_fact("People", "Dog: Max", true).await.unwrap());
    assert_eq!(facts.get_section("People").await.unwrap().as_deref(), Some("- Dog: Max"));
    assert!(!facts.add_fact("People", "dog: max", true).await.unwrap());

    assert!(facts.remove_fact("People", "Dog: Max").await.unwrap());
    assert_eq!(facts.get_section("People").await.unwrap().as_deref(), Some(""));
    assert!(!facts.remove_fact("People", "Dog: Max").await.unwrap());
}

/// A fresh store on the same file sees what an earlier one wrote
#[tokio::test]
async fn test_fact_store_persists() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("MEMORY.md");

    let mut first = FactStore::new(path.clone());
    first.init().await.unwrap();
    first.add_fact("Projects", "memkeep in Rust", true).await.unwrap();

    let mut second = FactStore::new(path);
    assert_eq!(second.list_facts("Projects").await.unwrap(), vec!["memkeep in Rust"]);
}

/// No file for today, then a decision creates the skeleton and lands under its heading
#[tokio::test]
async fn test_daily_log_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let daily = DailyLog::new(temp_dir.path().join("memory"));
    daily.init().await.unwrap();
    assert_eq!(daily.read_today().await.unwrap(), "");

    let before = chrono::Local::now();
    daily.add_entry("Shipped v1", DECISIONS_MADE).await.unwrap();
    let after = chrono::Local::now();

    let text = daily.read_today().await.unwrap();
    assert!(text.starts_with(&format!("# {}\n", chrono::Local::now().format("%Y-%m-%d"))));
    for section in ["Session Notes", "Decisions Made", "Ideas", "Tasks"] {
        assert!(text.contains(&format!("## {}\n", section)));
    }

    let decisions = SectionDocument::get_section(&text, DECISIONS_MADE).unwrap();
    let candidates = [
        format!("- [{}] Shipped v1", before.format("%H:%M")),
        format!("- [{}] Shipped v1", after.format("%H:%M")),
    ];
    assert!(candidates.contains(&decisions), "unexpected entry: {}", decisions);
    assert_eq!(SectionDocument::get_section(&text, "Session Notes").as_deref(), Some(""));
}

/// Totals equal the sum of counts, whatever compaction does
#[tokio::test]
async fn test_total_tokens_independent_of_compaction() {
    let temp_dir = TempDir::new().unwrap();
    let counter = ApproxTokenCounter;
    let mut transcript = Transcript::new(temp_dir.path().join("s.jsonl"), Arc::new(counter));
    transcript.init().await.unwrap();

    let messages = [
        "Can you help me plan the release?",
        "Sure, what is in scope?",
        "The parser rewrite and the new CLI.",
        "Then we should freeze the parser first.",
        "Agreed, and the CLI after that.",
        "I will draft the checklist now.",
    ];
    for (i, message) in messages.iter().enumerate() {
        if i % 2 == 0 {
            transcript.add_user_message(message, None).await.unwrap();
        } else {
            transcript.add_assistant_message(message, None).await.unwrap();
        }
    }
    let expected: usize = messages.iter().map(|m| counter.count_tokens(m)).sum();
    assert_eq!(transcript.total_tokens(), expected);

    let policy = CompactionPolicy::new(memkeep::session::CompactionSettings {
        keep_recent_tokens: 10,
        ..Default::default()
    });
    let outcome = policy.compact(&mut transcript, &EchoSummarizer).await.unwrap();
    let CompactionOutcome::Compacted(result) = outcome else {
        panic!("expected compaction");
    };

    let boundary = transcript.entries().last().unwrap().clone();
    assert_eq!(boundary.kind, EntryKind::Compaction);
    assert_eq!(boundary.content, result.summary);
    assert_eq!(transcript.total_tokens(), expected + boundary.token_count);

    // The recent view starts exactly at the boundary.
    assert_eq!(transcript.recent_entries()[0].id, boundary.id);
    assert_eq!(transcript.recent_tokens(), boundary.token_count);

    transcript.reload().await.unwrap();
    assert_eq!(transcript.total_tokens(), expected + boundary.token_count);
    assert_eq!(transcript.recent_entries()[0], boundary);
}

/// Compaction refuses to run without a session or a summarizer
#[tokio::test]
async fn test_manager_compaction_preconditions() {
    let temp_dir = TempDir::new().unwrap();
    let config = MemkeepConfig::new(temp_dir.path().to_path_buf());
    let mut manager = MemoryManager::open(config, Arc::new(ApproxTokenCounter))
        .await
        .unwrap();

    assert!(matches!(manager.compact().await, Err(MemkeepError::NoActiveSession)));

    let meta = manager.start_session().await.unwrap();
    assert!(matches!(manager.compact().await, Err(MemkeepError::NoSummarizer)));

    manager.set_summarizer(Some(Arc::new(EchoSummarizer)));
    manager.add_user_message("only one message").await.unwrap();
    assert_eq!(manager.compact().await.unwrap(), CompactionOutcome::NothingToDo);

    let transcript_path = temp_dir
        .path()
        .join("agents/main/sessions")
        .join(format!("{}.jsonl", meta.id));
    let raw = std::fs::read_to_string(transcript_path).unwrap();
    assert_eq!(raw.lines().count(), 1);
}

/// Context combines long-term memory with today's notes
#[tokio::test]
async fn test_manager_context() {
    let temp_dir = TempDir::new().unwrap();
    let config = MemkeepConfig::new(temp_dir.path().to_path_buf()).with_agent_id("helper");
    let mut manager = MemoryManager::open(config, Arc::new(ApproxTokenCounter))
        .await
        .unwrap();

    manager
        .facts()
        .add_fact("Preferences", "Answers in English", true)
        .await
        .unwrap();
    manager.daily().add_task("Write release notes").await.unwrap();

    let context = manager.build_context().await.unwrap();
    assert!(context.contains("- Answers in English"));
    assert!(context.contains("] Write release notes"));
    assert!(temp_dir.path().join("agents/helper/sessions").is_dir());
}
