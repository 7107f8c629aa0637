use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{ExtractError, Extractor, TaskCandidate};
use crate::priority::Priority;

/// Shorter descriptions are noise ("ok", "tbd").
pub const MIN_DESCRIPTION_CHARS: usize = 6;

enum PriorityFrom {
    Fixed(Priority),
    /// Capture group 1 holds a priority tag; the description is group 2.
    Tag,
}

struct LinePattern {
    name: &'static str,
    regex: Regex,
    priority: PriorityFrom,
}

fn pattern(name: &'static str, regex: &str, priority: PriorityFrom) -> LinePattern {
    LinePattern {
        name,
        regex: Regex::new(regex).expect("regex"),
        priority,
    }
}

/// First matching pattern per line wins.
static PATTERNS: LazyLock<Vec<LinePattern>> = LazyLock::new(|| {
    vec![
        pattern(
            "checkbox",
            r"^\s*[-*+]\s+\[\s?\]\s+(.+)$",
            PriorityFrom::Fixed(Priority::Medium),
        ),
        pattern(
            "req-id",
            r"(?i)^\s*(?:[-*+]\s+)?\**REQ-\d+\**\s*:\s*(.+)$",
            PriorityFrom::Fixed(Priority::High),
        ),
        pattern(
            "must",
            r"^\s*(?:[-*+]\s+)?\**MUST\**\s*:\s*(.+)$",
            PriorityFrom::Fixed(Priority::Critical),
        ),
        pattern(
            "should",
            r"^\s*(?:[-*+]\s+)?\**SHOULD\**\s*:\s*(.+)$",
            PriorityFrom::Fixed(Priority::High),
        ),
        pattern(
            "may",
            r"^\s*(?:[-*+]\s+)?\**MAY\**\s*:\s*(.+)$",
            PriorityFrom::Fixed(Priority::Low),
        ),
        pattern(
            "modal-must",
            r"(?i)^\s*(?:\d+[.)]|[-*+])\s+(.*\b(?:must|shall|is\s+required\s+to)\b.*)$",
            PriorityFrom::Fixed(Priority::High),
        ),
        pattern(
            "modal-should",
            r"(?i)^\s*(?:\d+[.)]|[-*+])\s+(.*\b(?:should|will|needs?\s+to|has\s+to|have\s+to)\b.*)$",
            PriorityFrom::Fixed(Priority::Medium),
        ),
        pattern(
            "action-heading",
            r"(?i)^#{1,6}\s+((?:implement|add|create|build|fix|support|enable|integrate|design|develop|update|remove|refactor|migrate|improve)\b.*)$",
            PriorityFrom::Fixed(Priority::Medium),
        ),
        pattern(
            "priority-tag",
            r"(?i)^\s*(?:[-*+]\s+|\d+[.)]\s+)?\[(critical|high|medium|low)\]\s*:?\s*(.+)$",
            PriorityFrom::Tag,
        ),
    ]
});

/// Deterministic line-pattern parser for requirement documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequirementsParser;

impl RequirementsParser {
    pub fn parse(&self, content: &str) -> Vec<TaskCandidate> {
        content
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| parse_line(line).map(|(priority, description)| {
                TaskCandidate::new(description, priority, Some(idx + 1))
            }))
            .collect()
    }
}

#[async_trait]
impl Extractor for RequirementsParser {
    fn name(&self) -> &'static str {
        "requirements-patterns"
    }

    async fn extract(&self, text: &str) -> Result<Vec<TaskCandidate>, ExtractError> {
        Ok(self.parse(text))
    }
}

fn parse_line(line: &str) -> Option<(Priority, String)> {
    for pattern in PATTERNS.iter() {
        let Some(caps) = pattern.regex.captures(line) else {
            continue;
        };
        let (priority, raw) = match pattern.priority {
            PriorityFrom::Fixed(priority) => (priority, caps.get(1)?.as_str()),
            PriorityFrom::Tag => {
                let priority = caps.get(1)?.as_str().parse::<Priority>().ok()?;
                (priority, caps.get(2)?.as_str())
            }
        };
        let description = clean(raw);
        // First match decides the line even when its text is too short.
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            tracing::debug!(pattern = pattern.name, line, "discarding short requirement");
            return None;
        }
        return Some((priority, description));
    }
    None
}

fn clean(raw: &str) -> String {
    raw.trim().trim_matches('*').trim().to_string()
}
