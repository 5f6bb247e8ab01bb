//! Daily notes: one markdown file per local calendar date.
//!
//! Directory layout:
//!   {dir}/YYYY-MM-DD.md

use super::section::{search_regex, SectionDocument};
use crate::Result;
use chrono::{DateTime, Duration, Local, NaiveDate};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const SESSION_NOTES: &str = "Session Notes";
pub const DECISIONS_MADE: &str = "Decisions Made";
pub const IDEAS: &str = "Ideas";
pub const TASKS: &str = "Tasks";

/// Sections every new daily file starts with.
pub const DEFAULT_DAILY_SECTIONS: [&str; 4] = [SESSION_NOTES, DECISIONS_MADE, IDEAS, TASKS];

const DATE_FORMAT: &str = "%Y-%m-%d";
const FILE_EXTENSION: &str = "md";

/// Append-only per-date note ledger.
#[derive(Debug, Clone)]
pub struct DailyLog {
    dir: PathBuf,
}

impl DailyLog {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Add a timestamped entry to today's file.
    pub async fn add_entry(&self, content: &str, section: &str) -> Result<()> {
        self.add_entry_at(content, section, Local::now()).await
    }

    /// Add `- [HH:MM] content` under `section` in the file for `when`'s date.
    pub async fn add_entry_at(
        &self,
        content: &str,
        section: &str,
        when: DateTime<Local>,
    ) -> Result<()> {
        let date = when.date_naive();
        let path = self.ensure_file(date).await?;

        let text = fs::read_to_string(&path).await?;
        let line = format!("- [{}] {}", when.format("%H:%M"), content.trim());
        let updated = SectionDocument::upsert_in_section(&text, section, &line, true);
        write_file(&path, &updated).await?;

        debug!("Added daily entry to {} / {}", date, section);
        Ok(())
    }

    pub async fn add_note(&self, content: &str) -> Result<()> {
        self.add_entry(content, SESSION_NOTES).await
    }

    pub async fn add_decision(&self, content: &str) -> Result<()> {
        self.add_entry(content, DECISIONS_MADE).await
    }

    pub async fn add_idea(&self, content: &str) -> Result<()> {
        self.add_entry(content, IDEAS).await
    }

    pub async fn add_task(&self, content: &str) -> Result<()> {
        self.add_entry(content, TASKS).await
    }

    /// Raw file contents for `date`, empty if there is no file.
    pub async fn read_date(&self, date: NaiveDate) -> Result<String> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(String::new());
        }
        Ok(fs::read_to_string(&path).await?)
    }

    pub async fn read_today(&self) -> Result<String> {
        self.read_date(today()).await
    }

    pub async fn read_yesterday(&self) -> Result<String> {
        self.read_date(yesterday()).await
    }

    /// Dates that have a file, most recent first.
    pub async fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut dates = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(date) = entry.file_name().to_str().and_then(parse_file_name) {
                dates.push(date);
            }
        }
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    /// `(date, line)` for every matching line, newest date first.
    pub async fn search(&self, pattern: &str) -> Result<Vec<(NaiveDate, String)>> {
        let regex = search_regex(pattern)?;
        let mut results = Vec::new();
        for date in self.list_dates().await? {
            let text = self.read_date(date).await?;
            results.extend(
                text.lines()
                    .filter(|line| regex.is_match(line))
                    .map(|line| (date, line.to_string())),
            );
        }
        Ok(results)
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{}", date.format(DATE_FORMAT), FILE_EXTENSION))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_file(&self, date: NaiveDate) -> Result<PathBuf> {
        let path = self.path_for(date);
        if !path.exists() {
            fs::create_dir_all(&self.dir).await?;
            write_file(&path, &skeleton(date)).await?;
            debug!("Created daily file {:?}", path);
        }
        Ok(path)
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn yesterday() -> NaiveDate {
    today() - Duration::days(1)
}

fn skeleton(date: NaiveDate) -> String {
    let mut md = format!("# {}\n", date.format(DATE_FORMAT));
    for section in DEFAULT_DAILY_SECTIONS {
        md.push_str(&format!("\n## {}\n", section));
    }
    md
}

fn parse_file_name(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(FILE_EXTENSION)?.strip_suffix('.')?;
    // Reject non-padded forms that chrono would still accept.
    if stem.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
}

async fn write_file(path: &Path, text: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
