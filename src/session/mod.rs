//! Session module for Memkeep
//!
//! Append-only conversation transcripts, their compaction, and the
//! per-agent session index.

mod compact;
mod store;
mod transcript;

pub use compact::{
    CompactionOutcome, CompactionPolicy, CompactionResult, CompactionSettings,
    DEFAULT_CONTEXT_WINDOW, DEFAULT_KEEP_RECENT_TOKENS, DEFAULT_RESERVE_TOKENS,
    DEFAULT_SOFT_THRESHOLD_TOKENS,
};
pub use store::{SessionMeta, SessionStore};
pub use transcript::{
    EntryKind, HistoryMessage, NewEntry, Role, Transcript, TranscriptEntry, SUMMARY_PREFIX,
};
