//! Heading-delimited markdown sections.
//!
//! A document is split into sections at every heading line made of one to
//! three `#` characters, whitespace, and a title. Everything up to the next
//! such heading is the section body. Text before the first heading (or the
//! whole document, when it has no headings) belongs to an untitled section
//! whose title is the empty string.
//!
//! All edits are pure text transforms. Rendered output always ends with a
//! single newline.

use crate::Result;
use regex::{Regex, RegexBuilder};

/// Deepest heading level that starts a new section.
const MAX_HEADING_LEVEL: usize = 3;

/// A parsed section of a markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Trimmed heading text, empty for the untitled leading section
    pub title: String,
    /// Number of `#` characters, 0 for the untitled leading section
    pub level: usize,
    /// Body text exactly as stored in the document
    pub raw_body: String,
}

impl Section {
    /// Body with leading and trailing blank lines removed.
    pub fn body(&self) -> String {
        let lines: Vec<&str> = self.raw_body.lines().collect();
        trim_blank_lines(&lines).join("\n")
    }
}

/// Line range of one section inside a split document.
#[derive(Debug)]
struct Span {
    title: String,
    level: usize,
    /// First body line (the line after the heading)
    start: usize,
    /// One past the last body line
    end: usize,
}

/// Section parsing and editing over plain markdown text.
pub struct SectionDocument;

impl SectionDocument {
    /// Parse `text` into its sections, in document order.
    ///
    /// Repeated titles produce repeated sections.
    pub fn parse(text: &str) -> Vec<Section> {
        let lines: Vec<&str> = text.lines().collect();
        spans(&lines)
            .into_iter()
            .map(|span| Section {
                raw_body: lines[span.start..span.end].join("\n"),
                title: span.title,
                level: span.level,
            })
            .collect()
    }

    /// Body of the first section titled `title`, trimmed of blank lines.
    ///
    /// Matching is exact and case-sensitive on the trimmed title. When a
    /// title appears more than once only the first section is visible.
    pub fn get_section(text: &str, title: &str) -> Option<String> {
        let lines: Vec<&str> = text.lines().collect();
        let spans = spans(&lines);
        let span = find_span(&spans, title)?;
        Some(trim_blank_lines(&lines[span.start..span.end]).join("\n"))
    }

    /// Append `new_line` as the last line of the section body.
    ///
    /// Trailing blank lines of the body are collapsed so that exactly one
    /// blank line separates the body from the next heading. A missing section
    /// is appended as `## title` when `create_if_missing` is set; otherwise
    /// the text comes back unchanged.
    pub fn upsert_in_section(
        text: &str,
        title: &str,
        new_line: &str,
        create_if_missing: bool,
    ) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let spans = spans(&lines);
        match find_span(&spans, title) {
            Some(span) => {
                let mut body = trim_trailing_blank_lines(&lines[span.start..span.end]).to_vec();
                body.push(new_line);
                splice(&lines, span, &body)
            }
            None if create_if_missing => append_section(&lines, title, &[new_line]),
            None => text.to_string(),
        }
    }

    /// Replace the whole body of the section, creating it at the end if missing.
    pub fn replace_section(text: &str, title: &str, new_body: &str) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let spans = spans(&lines);
        let body_lines: Vec<&str> = new_body.lines().collect();
        let body = trim_blank_lines(&body_lines);
        match find_span(&spans, title) {
            Some(span) => splice(&lines, span, body),
            None => append_section(&lines, title, body),
        }
    }

    /// Delete the first body line of the section for which `matches` holds.
    ///
    /// Returns `None` when the section is missing or no line matched.
    pub fn remove_line_in_section<F>(text: &str, title: &str, matches: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        let lines: Vec<&str> = text.lines().collect();
        let spans = spans(&lines);
        let span = find_span(&spans, title)?;
        let index = (span.start..span.end).find(|&i| matches(lines[i]))?;

        let mut remaining = lines.clone();
        remaining.remove(index);
        Some(render(&remaining))
    }
}

/// Case-insensitive line matcher for a user-supplied search pattern.
///
/// Patterns that are not valid regular expressions match literally.
pub fn search_regex(pattern: &str) -> Result<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Ok(regex),
        Err(_) => Ok(RegexBuilder::new(&regex::escape(pattern))
            .case_insensitive(true)
            .build()?),
    }
}

/// Parse a heading line into `(level, title)`.
fn parse_heading(line: &str) -> Option<(usize, String)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > MAX_HEADING_LEVEL {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        return None;
    }
    Some((level, title.to_string()))
}

fn spans(lines: &[&str]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut current: Option<Span> = None;

    for (i, line) in lines.iter().enumerate() {
        let Some((level, title)) = parse_heading(line) else {
            continue;
        };
        match current.take() {
            Some(mut span) => {
                span.end = i;
                spans.push(span);
            }
            None if i > 0 => spans.push(Span {
                title: String::new(),
                level: 0,
                start: 0,
                end: i,
            }),
            None => {}
        }
        current = Some(Span {
            title,
            level,
            start: i + 1,
            end: lines.len(),
        });
    }

    match current {
        Some(span) => spans.push(span),
        None => spans.push(Span {
            title: String::new(),
            level: 0,
            start: 0,
            end: lines.len(),
        }),
    }
    spans
}

fn find_span<'s>(spans: &'s [Span], title: &str) -> Option<&'s Span> {
    let title = title.trim();
    spans.iter().find(|span| span.title == title)
}

/// Rebuild the document with the body of `span` swapped for `body`.
fn splice(lines: &[&str], span: &Span, body: &[&str]) -> String {
    let mut out: Vec<&str> = lines[..span.start].to_vec();
    out.extend_from_slice(body);
    if span.end < lines.len() {
        out.push("");
        out.extend_from_slice(&lines[span.end..]);
    }
    render(&out)
}

fn append_section(lines: &[&str], title: &str, body: &[&str]) -> String {
    let heading = format!("## {}", title.trim());
    let mut out = trim_trailing_blank_lines(lines).to_vec();
    if !out.is_empty() {
        out.push("");
    }
    out.push(&heading);
    out.extend_from_slice(body);
    render(&out)
}

fn render(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn trim_trailing_blank_lines<'a, 'b>(lines: &'a [&'b str]) -> &'a [&'b str] {
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(0, |i| i + 1);
    &lines[..end]
}

fn trim_blank_lines<'a, 'b>(lines: &'a [&'b str]) -> &'a [&'b str] {
    let lines = trim_trailing_blank_lines(lines);
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    &lines[start..]
}
