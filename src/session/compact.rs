//! Transcript compaction.
//!
//! When the recent part of a transcript grows past the configured budget,
//! the oldest recent entries are summarized and a `compaction` entry is
//! appended in their place:
//!   1. Keep the newest entries that fit in `keep_recent_tokens`
//!   2. Summarize the user/assistant messages before them
//!   3. Append the summary as a compaction boundary
//!
//! The summarized entries stay in the file; they only leave the recent view.

use super::transcript::{EntryKind, Transcript, TranscriptEntry};
use crate::summarize::Summarizer;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default context window size (tokens)
pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;
pub const DEFAULT_RESERVE_TOKENS: usize = 16_384;
pub const DEFAULT_SOFT_THRESHOLD_TOKENS: usize = 4_000;
pub const DEFAULT_KEEP_RECENT_TOKENS: usize = 20_000;

/// Fewest recent entries worth compacting
const MIN_ENTRIES_TO_COMPACT: usize = 5;

/// Token budgets driving compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionSettings {
    pub context_window: usize,
    pub reserve_tokens: usize,
    pub soft_threshold_tokens: usize,
    pub keep_recent_tokens: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            reserve_tokens: DEFAULT_RESERVE_TOKENS,
            soft_threshold_tokens: DEFAULT_SOFT_THRESHOLD_TOKENS,
            keep_recent_tokens: DEFAULT_KEEP_RECENT_TOKENS,
        }
    }
}

/// What a successful compaction did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    pub summary: String,
    pub entries_removed: usize,
    /// Recent tokens before, minus kept tokens, minus summary tokens.
    /// Negative when the summary outweighs what it replaced.
    pub tokens_saved: i64,
    pub recent_tokens_after: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Too few or too small recent entries; the transcript was not touched.
    NothingToDo,
    Compacted(CompactionResult),
}

/// Decides when and how much of a transcript to compact.
#[derive(Debug, Clone, Default)]
pub struct CompactionPolicy {
    settings: CompactionSettings,
}

impl CompactionPolicy {
    pub fn new(settings: CompactionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    /// `context_window - reserve_tokens - soft_threshold_tokens`, floored at 0.
    pub fn threshold(&self) -> usize {
        self.settings
            .context_window
            .saturating_sub(self.settings.reserve_tokens)
            .saturating_sub(self.settings.soft_threshold_tokens)
    }

    /// Time to write important context out to daily notes.
    ///
    /// Reads in-memory state; `transcript` must have been loaded.
    pub fn needs_memory_flush(&self, transcript: &Transcript) -> bool {
        transcript.recent_tokens() >= self.threshold()
    }

    /// Time to compact. Uses the same threshold as [`Self::needs_memory_flush`].
    pub fn needs_compaction(&self, transcript: &Transcript) -> bool {
        transcript.recent_tokens() >= self.threshold()
    }

    /// Summarize the older part of the recent entries and append a boundary.
    ///
    /// Summarizer errors propagate unchanged and leave the transcript as it was.
    pub async fn compact(
        &self,
        transcript: &mut Transcript,
        summarizer: &dyn Summarizer,
    ) -> Result<CompactionOutcome> {
        transcript.load().await?;
        let recent = transcript.recent_entries();
        if recent.len() < MIN_ENTRIES_TO_COMPACT {
            debug!("Skipping compaction: only {} recent entries", recent.len());
            return Ok(CompactionOutcome::NothingToDo);
        }

        let cut = cut_point(recent, self.settings.keep_recent_tokens);
        if cut <= 1 {
            debug!("Skipping compaction: recent entries fit the keep budget");
            return Ok(CompactionOutcome::NothingToDo);
        }

        let (to_summarize, kept) = recent.split_at(cut);
        let recent_total: usize = recent.iter().map(|e| e.token_count).sum();
        let kept_tokens: usize = kept.iter().map(|e| e.token_count).sum();
        let removed_ids: Vec<String> = to_summarize.iter().map(|e| e.id.clone()).collect();
        let text = render_messages(to_summarize);

        info!(
            "Compaction triggered ({} entries, {} recent tokens, keeping {})",
            to_summarize.len(),
            recent_total,
            kept_tokens
        );

        let summary = summarizer.summarize(&text).await?;
        transcript.add_compaction(&summary, &removed_ids).await?;

        let summary_tokens = transcript.counter().count_tokens(&summary);
        let tokens_saved = recent_total as i64 - kept_tokens as i64 - summary_tokens as i64;
        let recent_tokens_after = transcript.recent_tokens();

        info!(
            "Compaction complete: {} entries summarized, {} tokens saved",
            removed_ids.len(),
            tokens_saved
        );

        Ok(CompactionOutcome::Compacted(CompactionResult {
            summary,
            entries_removed: removed_ids.len(),
            tokens_saved,
            recent_tokens_after,
        }))
    }
}

/// Index of the first entry to keep.
///
/// Walks from newest to oldest; the entry whose tokens push the running sum
/// past `keep_tokens` is the last one summarized. Returns 0 when everything
/// fits.
fn cut_point(entries: &[TranscriptEntry], keep_tokens: usize) -> usize {
    let mut accumulated = 0;
    for (index, entry) in entries.iter().enumerate().rev() {
        accumulated += entry.token_count;
        if accumulated > keep_tokens {
            return index + 1;
        }
    }
    0
}

/// `Role: content` for every message entry, blank-line separated.
fn render_messages(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .filter(|entry| entry.kind == EntryKind::Message)
        .map(|entry| {
            let role = entry.role.map_or("User", |role| role.label());
            format!("{}: {}", role, entry.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
