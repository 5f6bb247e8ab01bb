//! Context builder for prompt assembly

use super::daily::{today, yesterday};
use super::{DailyLog, FactStore};
use crate::Result;

/// Builds the memory block injected ahead of a conversation:
/// long-term memory, then today's notes, then yesterday's notes.
pub struct ContextBuilder<'a> {
    facts: &'a mut FactStore,
    daily: Option<&'a DailyLog>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(facts: &'a mut FactStore) -> Self {
        Self { facts, daily: None }
    }

    /// Add daily notes context
    pub fn with_daily(mut self, daily: &'a DailyLog) -> Self {
        self.daily = Some(daily);
        self
    }

    /// Concatenate every non-empty part, each under its own banner.
    pub async fn build(self) -> Result<String> {
        let mut context = String::new();

        let long_term = self.facts.read().await?;
        push_part(&mut context, "=== Long-Term Memory ===", &long_term);

        if let Some(daily) = self.daily {
            let today_date = today();
            let today_text = daily.read_date(today_date).await?;
            push_part(
                &mut context,
                &format!("=== Daily Notes ({} - today) ===", today_date),
                &today_text,
            );

            let yesterday_date = yesterday();
            let yesterday_text = daily.read_date(yesterday_date).await?;
            push_part(
                &mut context,
                &format!("=== Daily Notes ({} - yesterday) ===", yesterday_date),
                &yesterday_text,
            );
        }

        Ok(context.trim_end().to_string())
    }
}

fn push_part(context: &mut String, banner: &str, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    context.push_str(banner);
    context.push('\n');
    context.push_str(text);
    context.push_str("\n\n");
}
