//! AI-assisted extraction.
//!
//! The model is asked for a JSON array of `{description, priority}` objects.
//! Anything that goes wrong short of an aborted call yields an empty list.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{ExtractError, Extractor, TaskCandidate};
use crate::completion::{complete_text, ChatMessage, CompletionError, CompletionOptions, CompletionService};
use crate::priority::Priority;
use crate::task::Task;

/// AI descriptions must be longer than this many characters.
const MIN_AI_DESCRIPTION_CHARS: usize = 5;

pub const REQUIREMENTS_INSTRUCTION: &str = "You extract actionable software requirements from documents. \
Respond with ONLY a JSON array. Each element must be an object with a \"description\" string \
(one concrete, actionable requirement) and a \"priority\" string that is one of \
\"critical\", \"high\", \"medium\" or \"low\". Respond with [] when the document contains no requirements.";

pub const CODE_COMMENTS_INSTRUCTION: &str = "You find unfinished work in source code: comments that describe \
missing functionality, known bugs or follow-ups. Respond with ONLY a JSON array. Each element must be an \
object with a \"description\" string and a \"priority\" string that is one of \"critical\", \"high\", \
\"medium\" or \"low\". Respond with [] when nothing needs doing.";

pub fn decomposition_instruction(parent_priority: Priority) -> String {
    format!(
        "You break software tasks into smaller subtasks. Split the task below into 3 to 7 concrete, \
independently completable subtasks. The parent task has {} priority; give each subtask a priority \
relative to it (critical, high, medium or low). Respond with ONLY a JSON array of objects with \
\"description\" and \"priority\" strings. Respond with [] if the task is already atomic.",
        parent_priority
    )
}

pub struct AiExtractor<'a> {
    name: &'static str,
    service: &'a dyn CompletionService,
    instruction: String,
    cancel: CancellationToken,
}

impl<'a> AiExtractor<'a> {
    pub fn requirements(service: &'a dyn CompletionService, cancel: CancellationToken) -> Self {
        AiExtractor {
            name: "requirements-ai",
            service,
            instruction: REQUIREMENTS_INSTRUCTION.to_string(),
            cancel,
        }
    }

    pub fn code_comments(service: &'a dyn CompletionService, cancel: CancellationToken) -> Self {
        AiExtractor {
            name: "code-comments-ai",
            service,
            instruction: CODE_COMMENTS_INSTRUCTION.to_string(),
            cancel,
        }
    }
}

#[async_trait]
impl Extractor for AiExtractor<'_> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn extract(&self, text: &str) -> Result<Vec<TaskCandidate>, ExtractError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let messages = [
            ChatMessage::user(self.instruction.clone()),
            ChatMessage::user(text.to_string()),
        ];
        ask_for_candidates(self.service, &messages, self.name, &self.cancel).await
    }
}

/// Proposes subtasks for `task`; an empty result means "leave it atomic".
pub async fn analyze_decomposition(
    service: &dyn CompletionService,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<Vec<TaskCandidate>, ExtractError> {
    let mut brief = format!("Task {}: {}", task.id, task.title);
    if task.description_or_title() != task.title {
        brief.push_str("\n\n");
        brief.push_str(task.description_or_title());
    }
    if let Some(enriched) = &task.enriched_content {
        brief.push_str("\n\nAdditional context:\n");
        brief.push_str(&enriched.description);
    }
    let messages = [
        ChatMessage::user(decomposition_instruction(task.effective_priority())),
        ChatMessage::user(brief),
    ];
    ask_for_candidates(service, &messages, "decomposition", cancel).await
}

async fn ask_for_candidates(
    service: &dyn CompletionService,
    messages: &[ChatMessage],
    purpose: &'static str,
    cancel: &CancellationToken,
) -> Result<Vec<TaskCandidate>, ExtractError> {
    let options = CompletionOptions::justified(purpose);
    match complete_text(service, messages, &options, cancel).await {
        Ok(response) => Ok(parse_candidates(&response)),
        Err(CompletionError::Aborted) => Err(ExtractError::Aborted),
        Err(err) => {
            tracing::warn!(purpose, error = %err, "AI extraction unavailable");
            Ok(Vec::new())
        }
    }
}

/// Parses a model response, tolerating markdown fences and surrounding prose.
pub fn parse_candidates(response: &str) -> Vec<TaskCandidate> {
    let body = strip_code_fence(response);
    let Some(json) = slice_array(body) else {
        tracing::debug!("AI response contained no JSON array");
        return Vec::new();
    };
    let items = match serde_json::from_str::<Value>(json) {
        Ok(Value::Array(items)) => items,
        Ok(_) => return Vec::new(),
        Err(err) => {
            tracing::debug!(error = %err, "AI response was not valid JSON");
            return Vec::new();
        }
    };
    items.iter().filter_map(candidate_from_value).collect()
}

fn candidate_from_value(item: &Value) -> Option<TaskCandidate> {
    let description = item.get("description")?.as_str()?.trim();
    if description.chars().count() <= MIN_AI_DESCRIPTION_CHARS {
        return None;
    }
    let priority = item
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|value| value.parse::<Priority>().ok())
        .unwrap_or(Priority::Medium);
    Some(TaskCandidate::new(description, priority, None))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    // Skip the language tag on the opening fence line.
    let after = match after.find('\n') {
        Some(newline) => &after[newline + 1..],
        None => after,
    };
    match after.find("```") {
        Some(end) => &after[..end],
        None => after,
    }
}

fn slice_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}
