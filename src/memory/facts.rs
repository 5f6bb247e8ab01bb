//! Long-term fact store backed by `MEMORY.md`.
//!
//! Facts are `- <text>` bullets grouped under `##` sections. Two facts are the
//! same when their trimmed text matches ignoring case.

use super::section::{search_regex, SectionDocument};
use crate::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Sections every new long-term file starts with.
pub const DEFAULT_FACT_SECTIONS: [&str; 4] = ["Preferences", "People", "Projects", "Facts"];

const LONG_TERM_TITLE: &str = "# Long-Term Memory";

/// Long-term memory file with an in-process copy of its text.
#[derive(Debug)]
pub struct FactStore {
    file_path: PathBuf,
    /// Last text read from or written to `file_path` by this instance
    cache: Option<String>,
}

impl FactStore {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            cache: None,
        }
    }

    /// Create the file with the default skeleton unless it already exists.
    pub async fn init(&mut self) -> Result<()> {
        if self.file_path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.write(skeleton()).await
    }

    /// Add `fact` as a bullet under `section`, creating the section if needed.
    ///
    /// Line breaks inside `fact` are folded into spaces so it stays one bullet.
    /// Returns `Ok(false)` for a blank fact, or when `skip_duplicates` is set
    /// and an equivalent bullet is already in the section; nothing is written
    /// in either case.
    pub async fn add_fact(
        &mut self,
        section: &str,
        fact: &str,
        skip_duplicates: bool,
    ) -> Result<bool> {
        let fact = single_line(fact);
        if fact.is_empty() {
            debug!("Ignoring blank fact for {}", section);
            return Ok(false);
        }
        let text = self.read().await?;
        let wanted = normalize(&fact);

        if skip_duplicates {
            let existing = SectionDocument::get_section(&text, section).unwrap_or_default();
            if existing
                .lines()
                .filter_map(bullet_text)
                .any(|bullet| normalize(bullet) == wanted)
            {
                debug!("Fact already present in {}: {}", section, fact);
                return Ok(false);
            }
        }

        let line = format!("- {}", fact);
        let updated = SectionDocument::upsert_in_section(&text, section, &line, true);
        self.write(updated).await?;
        Ok(true)
    }

    /// Remove the first bullet in `section` equivalent to `fact`.
    ///
    /// Returns `Ok(false)` when no such bullet exists.
    pub async fn remove_fact(&mut self, section: &str, fact: &str) -> Result<bool> {
        let wanted = normalize(&single_line(fact));
        if wanted.is_empty() {
            return Ok(false);
        }
        let text = self.read().await?;

        let updated = SectionDocument::remove_line_in_section(&text, section, |line| {
            bullet_text(line).is_some_and(|bullet| normalize(bullet) == wanted)
        });

        match updated {
            Some(updated) => {
                self.write(updated).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rewrite a whole section.
    pub async fn replace_section(&mut self, section: &str, body: &str) -> Result<()> {
        let text = self.read().await?;
        let updated = SectionDocument::replace_section(&text, section, body);
        self.write(updated).await
    }

    /// Trimmed body of a section, or `None` if the section does not exist.
    pub async fn get_section(&mut self, title: &str) -> Result<Option<String>> {
        let text = self.read().await?;
        Ok(SectionDocument::get_section(&text, title))
    }

    /// Bullet texts of one section, in file order.
    pub async fn list_facts(&mut self, section: &str) -> Result<Vec<String>> {
        let body = self.get_section(section).await?.unwrap_or_default();
        Ok(body
            .lines()
            .filter_map(bullet_text)
            .map(str::to_string)
            .collect())
    }

    /// Full file text. Recreates the skeleton if the file has gone missing.
    pub async fn read(&mut self) -> Result<String> {
        if !self.file_path.exists() {
            self.cache = None;
            self.init().await?;
        }
        if let Some(text) = &self.cache {
            return Ok(text.clone());
        }
        let text = fs::read_to_string(&self.file_path).await?;
        self.cache = Some(text.clone());
        Ok(text)
    }

    /// Every raw line of the file matching `pattern`, case-insensitively.
    pub async fn search(&mut self, pattern: &str) -> Result<Vec<String>> {
        let regex = search_regex(pattern)?;
        let text = self.read().await?;
        Ok(text
            .lines()
            .filter(|line| regex.is_match(line))
            .map(str::to_string)
            .collect())
    }

    /// Get the file path
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    async fn write(&mut self, text: String) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.file_path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;

        debug!("Wrote long-term memory to {:?}", self.file_path);
        self.cache = Some(text);
        Ok(())
    }
}

fn skeleton() -> String {
    let mut md = format!("{}\n", LONG_TERM_TITLE);
    for section in DEFAULT_FACT_SECTIONS {
        md.push_str(&format!("\n## {}\n", section));
    }
    md
}

/// Text of a `- ` or `* ` bullet line.
fn bullet_text(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .map(str::trim)
}

/// Join the non-blank lines of `fact` with single spaces.
fn single_line(fact: &str) -> String {
    fact.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize(fact: &str) -> String {
    fact.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> FactStore {
        let mut store = FactStore::new(dir.path().join("MEMORY.md"));
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_init_writes_skeleton() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;

        let text = store.read().await.unwrap();
        assert_eq!(
            text,
            "# Long-Term Memory\n\n## Preferences\n\n## People\n\n## Projects\n\n## Facts\n"
        );
        for section in DEFAULT_FACT_SECTIONS {
            assert_eq!(store.get_section(section).await.unwrap().as_deref(), Some(""));
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;
        store.add_fact("Facts", "Sky is blue", true).await.unwrap();

        let mut again = FactStore::new(store.file_path().to_path_buf());
        again.init().await.unwrap();
        assert_eq!(again.list_facts("Facts").await.unwrap(), vec!["Sky is blue"]);
    }

    #[tokio::test]
    async fn test_add_fact_dedups_case_and_whitespace() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;

        assert!(store.add_fact("People", "Dog: Max", true).await.unwrap());
        assert_eq!(
            store.get_section("People").await.unwrap().as_deref(),
            Some("- Dog: Max")
        );
        assert!(!store.add_fact("People", "dog: max", true).await.unwrap());
        assert!(!store.add_fact("People", "  DOG: MAX  ", true).await.unwrap());
        assert_eq!(store.list_facts("People").await.unwrap(), vec!["Dog: Max"]);
    }

    #[tokio::test]
    async fn test_add_fact_without_dedup_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;

        assert!(store.add_fact("Facts", "x", false).await.unwrap());
        assert!(store.add_fact("Facts", "x", false).await.unwrap());
        assert_eq!(store.list_facts("Facts").await.unwrap(), vec!["x", "x"]);
    }

    #[tokio::test]
    async fn test_add_fact_creates_missing_section() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;

        store.add_fact("Pets", "Cat: Tom", true).await.unwrap();
        let text = store.read().await.unwrap();
        assert!(text.ends_with("## Facts\n\n## Pets\n- Cat: Tom\n"));
    }

    #[tokio::test]
    async fn test_remove_fact() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;

        store.add_fact("Projects", "memkeep", true).await.unwrap();
        store.add_fact("Projects", "other", true).await.unwrap();
        assert!(store.remove_fact("Projects", " MEMKEEP ").await.unwrap());
        assert_eq!(store.list_facts("Projects").await.unwrap(), vec!["other"]);
        assert!(!store.remove_fact("Projects", "memkeep").await.unwrap());
        assert!(!store.remove_fact("Missing", "memkeep").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_only_first_duplicate() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;

        store.add_fact("Facts", "dup", false).await.unwrap();
        store.add_fact("Facts", "dup", false).await.unwrap();
        assert!(store.remove_fact("Facts", "dup").await.unwrap());
        assert_eq!(store.list_facts("Facts").await.unwrap(), vec!["dup"]);
    }

    #[tokio::test]
    async fn test_read_recreates_vanished_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;
        store.add_fact("Facts", "gone soon", true).await.unwrap();

        std::fs::remove_file(store.file_path()).unwrap();
        let text = store.read().await.unwrap();
        assert!(!text.contains("gone soon"));
        assert!(store.file_path().exists());
    }

    #[tokio::test]
    async fn test_search_lines() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;
        store.add_fact("People", "Dog: Max", true).await.unwrap();
        store.add_fact("Preferences", "Likes dark mode", true).await.unwrap();

        assert_eq!(store.search("dog").await.unwrap(), vec!["- Dog: Max"]);
        assert_eq!(store.search("^## p").await.unwrap(), vec!["## Preferences", "## People", "## Projects"]);
        assert!(store.search("nothing-here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multiline_fact_stays_one_bullet() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;

        assert!(store.add_fact("Facts", "likes tea\n## Injected", true).await.unwrap());
        assert!(!store.add_fact("Facts", "likes tea\n## Injected", true).await.unwrap());
        assert_eq!(
            store.list_facts("Facts").await.unwrap(),
            vec!["likes tea ## Injected"]
        );
        assert!(store.get_section("Injected").await.unwrap().is_none());

        assert!(store.remove_fact("Facts", "likes tea\n## injected").await.unwrap());
        assert!(store.list_facts("Facts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_fact_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;
        let before = store.read().await.unwrap();

        assert!(!store.add_fact("Facts", "   ", true).await.unwrap());
        assert!(!store.add_fact("Facts", " \n\t\n", false).await.unwrap());
        assert!(!store.remove_fact("Facts", "   ").await.unwrap());
        assert_eq!(store.read().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_replace_section() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir).await;
        store.add_fact("Facts", "old", true).await.unwrap();

        store.replace_section("Facts", "- new one\n- new two").await.unwrap();
        assert_eq!(store.list_facts("Facts").await.unwrap(), vec!["new one", "new two"]);
    }
}
