use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::priority::{de_lenient_priority, de_lenient_status, priority_rank, Priority, Status};

pub const DEFAULT_COLLECTION_NAME: &str = "Tasks";
pub const DEFAULT_COLLECTION_DESCRIPTION: &str = "Tasks tracked by taskchat";

const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceContext {
    Todo,
    Requirements,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSource {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<SourceContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentKind {
    Code,
    Requirements,
}

impl EnrichmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrichmentKind::Code => "code",
            EnrichmentKind::Requirements => "requirements",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedContent {
    pub description: String,
    #[serde(default)]
    pub context: String,
    pub enriched_at: String,
    #[serde(rename = "type")]
    pub kind: EnrichmentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "de_lenient_priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "de_lenient_status")]
    pub status: Status,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TaskSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_content: Option<EnrichedContent>,
    /// Keys written by other tools; carried through read-modify-write untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    /// A fresh `todo` task. An empty description falls back to the title.
    pub fn new(id: impl Into<String>, title: &str, description: &str, priority: Priority) -> Self {
        let title = title.trim().to_string();
        let description = match description.trim() {
            "" => title.clone(),
            text => text.to_string(),
        };
        Task {
            id: id.into(),
            title,
            description,
            priority: Some(priority),
            status: Status::Todo,
            completed: false,
            created_at: now_timestamp(),
            completed_at: None,
            tags: Vec::new(),
            source: None,
            subtasks: Vec::new(),
            parent_task_id: None,
            enriched_content: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn priority_rank(&self) -> u8 {
        priority_rank(self.priority)
    }

    pub fn effective_priority(&self) -> Priority {
        self.priority.unwrap_or(Priority::Medium)
    }

    pub fn description_or_title(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.title
        } else {
            &self.description
        }
    }

    pub fn add_tag(&mut self, tag: &str) {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|existing| existing == tag) {
            return;
        }
        self.tags.push(tag.to_string());
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
        self.status = Status::Completed;
        self.completed_at = Some(now_timestamp());
    }

    pub fn matches_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskCollection {
    pub fn empty() -> Self {
        TaskCollection {
            name: Some(DEFAULT_COLLECTION_NAME.to_string()),
            description: Some(DEFAULT_COLLECTION_DESCRIPTION.to_string()),
            tasks: Vec::new(),
        }
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.matches_id(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.matches_id(id))
    }

    pub fn open_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| !task.completed)
    }
}

impl Default for TaskCollection {
    fn default() -> Self {
        TaskCollection::empty()
    }
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// First line of `text`, cut to a title-sized length on a char boundary.
pub fn title_from_text(text: &str) -> String {
    let first = text.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");
    if first.chars().count() <= MAX_TITLE_CHARS {
        return first.to_string();
    }
    let cut: String = first.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}
