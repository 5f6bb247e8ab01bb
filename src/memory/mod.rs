//! Memory module for Memkeep
//!
//! Plain markdown memory: a curated long-term fact sheet (`MEMORY.md`) and
//! append-only daily notes (`memory/YYYY-MM-DD.md`), both edited section by
//! section.

mod context;
pub mod daily;
mod facts;
mod section;

pub use context::ContextBuilder;
pub use daily::{DailyLog, DEFAULT_DAILY_SECTIONS};
pub use facts::{FactStore, DEFAULT_FACT_SECTIONS};
pub use section::{search_regex, Section, SectionDocument};
