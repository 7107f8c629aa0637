//! Markdown projection of a single task.
//!
//! Mirrors are regenerated from the task every time; they are never parsed
//! back, so `tasks.json` stays the only source of truth.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::Serialize;
use thiserror::Error;

use crate::task::Task;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Failed to write mirror {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to render mirror front matter: {0}")]
    FrontMatter(#[from] serde_yaml::Error),
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    id: &'a str,
    title: &'a str,
    priority: &'a str,
    status: &'a str,
    completed: bool,
    created: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
}

pub fn render_mirror(task: &Task) -> Result<String, MirrorError> {
    let front = FrontMatter {
        id: &task.id,
        title: &task.title,
        priority: task.effective_priority().as_str(),
        status: task.status.as_str(),
        completed: task.completed,
        created: &task.created_at,
        completed_at: task.completed_at.as_deref(),
        tags: &task.tags,
        parent: task.parent_task_id.as_deref(),
    };
    let yaml = serde_yaml::to_string(&front)?;

    let mut lines: Vec<String> = Vec::new();
    lines.push("---".to_string());
    lines.push(yaml.trim_end().to_string());
    lines.push("---".to_string());
    lines.push(String::new());
    lines.push(format!("# {}: {}", task.id, task.title));
    lines.push(String::new());
    lines.push(format!("**Priority:** {}", task.effective_priority()));
    lines.push(format!("**Status:** {}", task.status));
    lines.push(format!("**Created:** {}", display_date(&task.created_at)));
    if let Some(done) = task.completed_at.as_deref() {
        lines.push(format!("**Completed:** {}", display_date(done)));
    }
    if !task.tags.is_empty() {
        lines.push(format!("**Tags:** {}", task.tags.join(", ")));
    }
    lines.push(String::new());
    lines.push("## Description".to_string());
    lines.push(String::new());
    lines.push(task.description_or_title().trim().to_string());

    if let Some(source) = &task.source {
        lines.push(String::new());
        lines.push("## Source".to_string());
        lines.push(String::new());
        let label = match source.line {
            Some(line) => format!("{}:{}", source.file, line),
            None => source.file.clone(),
        };
        let anchor = source
            .line
            .map(|line| format!("#L{}", line))
            .unwrap_or_default();
        lines.push(format!("[{}]({}{})", label, source.file, anchor));
    }

    if let Some(parent) = task.parent_task_id.as_deref() {
        lines.push(String::new());
        lines.push("## Parent Task".to_string());
        lines.push(String::new());
        lines.push(format!("[{}]({}.md)", parent, parent));
    }

    if !task.subtasks.is_empty() {
        lines.push(String::new());
        lines.push("## Subtasks".to_string());
        lines.push(String::new());
        for child in &task.subtasks {
            lines.push(format!("- [{}]({}.md)", child, child));
        }
    }

    if let Some(enriched) = &task.enriched_content {
        lines.push(String::new());
        lines.push("## Enriched Context".to_string());
        lines.push(String::new());
        lines.push(format!(
            "_{} context, enriched {}_",
            enriched.kind.as_str(),
            display_date(&enriched.enriched_at)
        ));
        lines.push(String::new());
        lines.push(enriched.description.trim().to_string());
        if !enriched.context.trim().is_empty() {
            lines.push(String::new());
            lines.push("### Supporting Context".to_string());
            lines.push(String::new());
            lines.push(enriched.context.trim_end().to_string());
        }
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    Ok(rendered)
}

/// Rewrites `<tasks_dir>/<id>.md` from scratch.
pub fn write_mirror(tasks_dir: &Path, task: &Task) -> Result<PathBuf, MirrorError> {
    let path = tasks_dir.join(format!("{}.md", task.id));
    let content = render_mirror(task)?;
    fs::create_dir_all(tasks_dir).map_err(|source| MirrorError::Io {
        path: tasks_dir.to_path_buf(),
        source,
    })?;
    fs::write(&path, content).map_err(|source| MirrorError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn display_date(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use crate::task::{EnrichedContent, EnrichmentKind, SourceContext, TaskSource};
    use tempfile::TempDir;

    fn sample() -> Task {
        let mut task = Task::new("TASK-007", "Fix race", "Fix the race in the watcher", Priority::High);
        task.created_at = "2026-03-04T10:00:00.000Z".to_string();
        task
    }

    #[test]
    fn render_includes_core_fields() {
        let rendered = render_mirror(&sample()).expect("render");
        assert!(rendered.starts_with("---\n"));
        assert!(rendered.contains("id: TASK-007"));
        assert!(rendered.contains("# TASK-007: Fix race"));
        assert!(rendered.contains("**Priority:** high"));
        assert!(rendered.contains("**Status:** todo"));
        assert!(rendered.contains("**Created:** 2026-03-04"));
        assert!(rendered.contains("Fix the race in the watcher"));
        assert!(!rendered.contains("## Source"));
        assert!(!rendered.contains("## Enriched Context"));
    }

    #[test]
    fn render_adds_source_and_enrichment_sections() {
        let mut task = sample();
        task.source = Some(TaskSource {
            file: "src/watch.rs".to_string(),
            line: Some(12),
            context: Some(SourceContext::Todo),
        });
        task.enriched_content = Some(EnrichedContent {
            description: "Guard the watcher map with a mutex.".to_string(),
            context: "fn watch() {}".to_string(),
            enriched_at: "2026-03-05T08:00:00.000Z".to_string(),
            kind: EnrichmentKind::Code,
        });
        let rendered = render_mirror(&task).expect("render");
        assert!(rendered.contains("[src/watch.rs:12](src/watch.rs#L12)"));
        assert!(rendered.contains("## Enriched Context"));
        assert!(rendered.contains("_code context, enriched 2026-03-05_"));
        assert!(rendered.contains("### Supporting Context"));
    }

    #[test]
    fn write_mirror_replaces_whole_file() {
        let temp = TempDir::new().expect("tempdir");
        let mut task = sample();
        let path = write_mirror(temp.path(), &task).expect("write");
        task.priority = Some(Priority::Low);
        write_mirror(temp.path(), &task).expect("rewrite");
        let content = fs::read_to_string(path).expect("read");
        assert!(content.contains("**Priority:** low"));
        assert!(!content.contains("**Priority:** high"));
    }
}
