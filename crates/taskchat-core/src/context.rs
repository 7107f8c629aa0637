//! Context lookups used when enriching a task.
//!
//! Tasks that came from a requirements document get the surrounding section
//! of that document; everything else gets a code snippet around its source
//! line.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::task::Task;

/// Lines of code shown on either side of a task's source line.
pub const SNIPPET_RADIUS: usize = 10;

#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn code_context(&self, task: &Task) -> Option<String>;

    async fn requirements_context(&self, task: &Task) -> Option<String>;
}

/// Reads context straight from files under the workspace root.
#[derive(Debug, Clone)]
pub struct WorkspaceContextProvider {
    root: PathBuf,
}

impl WorkspaceContextProvider {
    pub fn new(root: &Path) -> Self {
        WorkspaceContextProvider {
            root: root.to_path_buf(),
        }
    }

    fn read_source(&self, task: &Task) -> Option<(String, String, Option<usize>)> {
        let source = task.source.as_ref()?;
        let path = self.root.join(&source.file);
        match fs::read_to_string(&path) {
            Ok(text) => Some((source.file.clone(), text, source.line)),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "context source unreadable");
                None
            }
        }
    }
}

#[async_trait]
impl ContextProvider for WorkspaceContextProvider {
    async fn code_context(&self, task: &Task) -> Option<String> {
        let (file, text, line) = self.read_source(task)?;
        code_snippet(&file, &text, line.unwrap_or(1))
    }

    async fn requirements_context(&self, task: &Task) -> Option<String> {
        let (_, text, line) = self.read_source(task)?;
        requirements_section(&text, line.unwrap_or(1))
    }
}

/// Lines around `line` (1-based), fenced and labelled with their location.
pub fn code_snippet(file: &str, text: &str, line: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return None;
    }
    let target = line.clamp(1, lines.len());
    let start = target.saturating_sub(SNIPPET_RADIUS).max(1);
    let end = (target + SNIPPET_RADIUS).min(lines.len());
    let mut out = format!("{}:{}-{}\n```\n", file, start, end);
    for (offset, content) in lines[start - 1..end].iter().enumerate() {
        out.push_str(&format!("{:>4} | {}\n", start + offset, content));
    }
    out.push_str("```");
    Some(out)
}

/// The nearest markdown heading above `line` plus the paragraph containing it.
pub fn requirements_section(text: &str, line: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return None;
    }
    let idx = line.clamp(1, lines.len()) - 1;

    let heading = lines[..=idx]
        .iter()
        .rev()
        .find(|candidate| candidate.trim_start().starts_with('#'))
        .map(|heading| heading.trim().trim_start_matches('#').trim().to_string());

    let mut start = idx;
    while start > 0 && !lines[start - 1].trim().is_empty() && !lines[start - 1].trim_start().starts_with('#') {
        start -= 1;
    }
    let mut end = idx;
    while end + 1 < lines.len() && !lines[end + 1].trim().is_empty() && !lines[end + 1].trim_start().starts_with('#') {
        end += 1;
    }
    let paragraph = lines[start..=end]
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    match heading {
        Some(heading) if !paragraph.trim().is_empty() => {
            Some(format!("Section: {}\n\n{}", heading, paragraph.trim()))
        }
        Some(heading) => Some(format!("Section: {}", heading)),
        None if paragraph.trim().is_empty() => None,
        None => Some(paragraph.trim().to_string()),
    }
}
