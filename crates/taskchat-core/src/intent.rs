//! Utterance classification.
//!
//! Rules are evaluated top to bottom and the first one that produces an
//! [`Intent`] wins. The regex rules run on the raw utterance; the keyword
//! fallbacks run on its lower-cased form. Nothing is inferred beyond the
//! single utterance.

use std::sync::LazyLock;

use regex::Regex;

use crate::priority::{Priority, Status};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
    pub status: Option<Status>,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.completed.is_none() && self.status.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    InitializeTracking,
    CreateTask {
        description: String,
        priority: Option<Priority>,
    },
    ScanTodos {
        pattern: Option<String>,
    },
    ListTasks {
        filter: TaskFilter,
    },
    MarkComplete {
        task_id: Option<String>,
    },
    ChangePriority {
        task_id: Option<String>,
        priority: Option<Priority>,
    },
    ParseRequirements {
        file: Option<String>,
    },
    DecomposeTask {
        task_id: Option<String>,
    },
    EnrichTask {
        task_id: Option<String>,
    },
    RecommendNext,
    PrioritizeTasks,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::InitializeTracking => "initialize",
            Intent::CreateTask { .. } => "create",
            Intent::ScanTodos { .. } => "scan-todos",
            Intent::ListTasks { .. } => "list",
            Intent::MarkComplete { .. } => "mark-complete",
            Intent::ChangePriority { .. } => "change-priority",
            Intent::ParseRequirements { .. } => "parse-requirements",
            Intent::DecomposeTask { .. } => "decompose",
            Intent::EnrichTask { .. } => "enrich",
            Intent::RecommendNext => "recommend-next",
            Intent::PrioritizeTasks => "prioritize",
        }
    }
}

/// Both spellings of the utterance, computed once per classification.
pub struct Utterance<'a> {
    pub raw: &'a str,
    pub lower: String,
}

impl<'a> Utterance<'a> {
    pub fn new(raw: &'a str) -> Self {
        Utterance {
            raw,
            lower: raw.to_lowercase(),
        }
    }
}

pub struct Rule {
    pub name: &'static str,
    pub matcher: fn(&Utterance) -> Option<Intent>,
}

/// Precedence is the order of this table.
pub static RULES: &[Rule] = &[
    Rule {
        name: "initialize",
        matcher: match_initialize,
    },
    Rule {
        name: "create-with-priority",
        matcher: match_create_with_priority,
    },
    Rule {
        name: "create",
        matcher: match_create,
    },
    Rule {
        name: "scan-todos",
        matcher: match_scan_todos,
    },
    Rule {
        name: "initialize-keyword",
        matcher: match_initialize_keyword,
    },
    Rule {
        name: "priority-query",
        matcher: match_priority_query,
    },
    Rule {
        name: "mark-complete",
        matcher: match_mark_complete,
    },
    Rule {
        name: "change-priority",
        matcher: match_change_priority,
    },
    Rule {
        name: "parse-requirements",
        matcher: match_parse_requirements,
    },
    Rule {
        name: "decompose",
        matcher: match_decompose,
    },
    Rule {
        name: "enrich",
        matcher: match_enrich,
    },
    Rule {
        name: "recommend-next",
        matcher: match_recommend_next,
    },
    Rule {
        name: "prioritize",
        matcher: match_prioritize,
    },
    Rule {
        name: "list",
        matcher: match_list,
    },
];

pub fn classify(utterance: &str) -> Option<Intent> {
    classify_with_rule(utterance).map(|(_, intent)| intent)
}

pub fn classify_with_rule(utterance: &str) -> Option<(&'static str, Intent)> {
    let utterance = Utterance::new(utterance.trim());
    if utterance.raw.is_empty() {
        return None;
    }
    let matched = RULES
        .iter()
        .find_map(|rule| (rule.matcher)(&utterance).map(|intent| (rule.name, intent)));
    match &matched {
        Some((rule, intent)) => tracing::debug!(rule, ?intent, "classified utterance"),
        None => tracing::debug!("utterance left unclassified"),
    }
    matched
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("regex")
}

static INITIALIZE: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)^(?:please\s+)?(?:can\s+you\s+)?(?:initiali[sz]e|init|set\s*up|start|enable|begin)\s+(?:the\s+)?(?:task\s+tracking|tracking\s+tasks|tasks?\s+tracker)(?:\s+(?:for|in)\s+(?:this|the|my)\s+(?:project|workspace|repo(?:sitory)?))?\s*[.!]?$",
    )
});

static CREATE_WITH_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)^(?:(?:please|can\s+you|could\s+you|let's|lets|go\s+ahead\s+and)\s+)*(?:create|add|make|new)\s+(?:a\s+|an\s+|new\s+)*(critical|high|medium|low)(?:\s*-?\s*priority)?\s+task\b\s*(?:(?:to|for|about|called|named)\b|:|-)?\s*(.*)$",
    )
});

static CREATE: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)^(?:(?:please|can\s+you|could\s+you|let's|lets|go\s+ahead\s+and)\s+)*(?:create|add|make)\s+(?:a\s+|an\s+|new\s+|another\s+)*task\b\s*(?:(?:to|for|about|called|named)\b|:|-)?\s*(.*)$",
    )
});

static SCAN_TODOS: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"(?i)\b(?:scan|find|extract|create\s+tasks\s+from)\s+(?:for\s+)?(?:all\s+)?(?:the\s+)?(?:my\s+)?todos?\b(?:\s+comments?)?(?:\s+(?:in|under|from)\s+(.+?))?(?:\s+and\s+.*?)?\s*[.!]?$",
    )
});

static PRIORITY_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?:what|which|show|list)\s+(?:tasks?|todos?)\s+(?:are|is|have|has)\s+(?:a\s+)?(critical|high|medium|low)(?:\s+priority)?")
});

static TASK_ID: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)\b(task-\d+)\b"));

static MARK_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\bmark\b.*\bas\s+(?:complete|completed|done|finished)\b")
});

static MARK_AS_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\bmark\b.*\bas\s+(?:a\s+)?(critical|high|medium|low)(?:\s*-?\s*priority)\b")
});

static CHANGE_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(?:change|set|update)\b.*\bpriority\b.*?\bto\s+(critical|high|medium|low)\b")
});

static CHANGE_PRIORITY_INCOMPLETE: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\b(?:change|set|update)\b.*\bpriority\b"));

static PARSE_REQUIREMENTS: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?i)\bparse\s+(?:the\s+)?(?:file\s+|document\s+|requirements\s+(?:from\s+|in\s+)?)?(.*?)\s+and\s+(?:create|generate|make)\s+tasks?\b")
});

static DECOMPOSE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\bdecompose\b|\b(?:break|split)\b.*\bsub-?tasks?\b|\b(?:create|generate|make)\s+(?:some\s+|the\s+)?sub-?tasks?\b")
});

static ENRICH: LazyLock<Regex> = LazyLock::new(|| regex(r"\benrich\b"));

static RECOMMEND_NEXT: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(?:what|which)\b.*\bnext\b|\b(?:recommend|suggest)\b.*\btasks?\b|\bnext\s+task\b")
});

static PRIORITIZE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(?:prioriti[sz]e|sort|reorder|rank)\b.*\btasks?\b|\bprioriti[sz]e\b")
});

static LIST: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\b(?:read|list|show|get|view|display)\b"));

static FILTER_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(critical|high|medium|low)(?:\s*-?\s*priority)\b|\bpriority\s+(critical|high|medium|low)\b")
});

static FILTER_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\bstatus\s+(?:of\s+)?(backlog|todo|to-do|in[- ]progress|review|blocked|completed|done)\b")
});

static FILTER_COMPLETED: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\b(?:completed|finished|done)\s+tasks?\b"));

static FILTER_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\b(?:open|incomplete|pending|remaining|outstanding|unfinished)\b")
});

fn match_initialize(utterance: &Utterance) -> Option<Intent> {
    INITIALIZE
        .is_match(utterance.raw)
        .then_some(Intent::InitializeTracking)
}

fn match_create_with_priority(utterance: &Utterance) -> Option<Intent> {
    let caps = CREATE_WITH_PRIORITY.captures(utterance.raw)?;
    let priority = caps.get(1)?.as_str().parse::<Priority>().ok()?;
    let description = clean_description(caps.get(2)?.as_str())?;
    Some(Intent::CreateTask {
        description,
        priority: Some(priority),
    })
}

fn match_create(utterance: &Utterance) -> Option<Intent> {
    let caps = CREATE.captures(utterance.raw)?;
    let description = clean_description(caps.get(1)?.as_str())?;
    Some(Intent::CreateTask {
        description,
        priority: None,
    })
}

fn match_scan_todos(utterance: &Utterance) -> Option<Intent> {
    let caps = SCAN_TODOS.captures(utterance.raw)?;
    let pattern = caps
        .get(1)
        .map(|m| strip_quotes(m.as_str()))
        .filter(|value| !value.is_empty());
    Some(Intent::ScanTodos { pattern })
}

fn match_initialize_keyword(utterance: &Utterance) -> Option<Intent> {
    utterance
        .lower
        .contains("initialize task tracking")
        .then_some(Intent::InitializeTracking)
}

fn match_priority_query(utterance: &Utterance) -> Option<Intent> {
    let caps = PRIORITY_QUERY.captures(&utterance.lower)?;
    let priority = caps.get(1)?.as_str().parse::<Priority>().ok()?;
    Some(Intent::ListTasks {
        filter: TaskFilter {
            priority: Some(priority),
            ..Default::default()
        },
    })
}

fn match_mark_complete(utterance: &Utterance) -> Option<Intent> {
    if !MARK_COMPLETE.is_match(&utterance.lower) {
        return None;
    }
    Some(Intent::MarkComplete {
        task_id: extract_task_id(utterance.raw),
    })
}

fn match_change_priority(utterance: &Utterance) -> Option<Intent> {
    let priority = MARK_AS_PRIORITY
        .captures(&utterance.lower)
        .or_else(|| CHANGE_PRIORITY.captures(&utterance.lower))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<Priority>().ok());
    if priority.is_none() && !CHANGE_PRIORITY_INCOMPLETE.is_match(&utterance.lower) {
        return None;
    }
    Some(Intent::ChangePriority {
        task_id: extract_task_id(utterance.raw),
        priority,
    })
}

fn match_parse_requirements(utterance: &Utterance) -> Option<Intent> {
    let caps = PARSE_REQUIREMENTS.captures(utterance.raw)?;
    let file = caps
        .get(1)
        .map(|m| strip_quotes(m.as_str()))
        .filter(|value| !value.is_empty());
    Some(Intent::ParseRequirements { file })
}

fn match_decompose(utterance: &Utterance) -> Option<Intent> {
    DECOMPOSE.is_match(&utterance.lower).then(|| Intent::DecomposeTask {
        task_id: extract_task_id(utterance.raw),
    })
}

fn match_enrich(utterance: &Utterance) -> Option<Intent> {
    ENRICH.is_match(&utterance.lower).then(|| Intent::EnrichTask {
        task_id: extract_task_id(utterance.raw),
    })
}

fn match_recommend_next(utterance: &Utterance) -> Option<Intent> {
    RECOMMEND_NEXT
        .is_match(&utterance.lower)
        .then_some(Intent::RecommendNext)
}

fn match_prioritize(utterance: &Utterance) -> Option<Intent> {
    PRIORITIZE
        .is_match(&utterance.lower)
        .then_some(Intent::PrioritizeTasks)
}

fn match_list(utterance: &Utterance) -> Option<Intent> {
    if !LIST.is_match(&utterance.lower) {
        return None;
    }
    Some(Intent::ListTasks {
        filter: parse_filter(&utterance.lower),
    })
}

fn parse_filter(lower: &str) -> TaskFilter {
    let priority = FILTER_PRIORITY.captures(lower).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<Priority>().ok())
    });
    let status = FILTER_STATUS
        .captures(lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<Status>().ok());
    let completed = if FILTER_COMPLETED.is_match(lower) {
        Some(true)
    } else if FILTER_OPEN.is_match(lower) {
        Some(false)
    } else {
        None
    };
    TaskFilter {
        priority,
        completed,
        status,
    }
}

/// First `TASK-<n>` mentioned, upper-cased.
pub fn extract_task_id(text: &str) -> Option<String> {
    TASK_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
}

fn clean_description(raw: &str) -> Option<String> {
    let trimmed = strip_quotes(raw);
    let trimmed = trimmed.trim_end_matches(['.', '!']).trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn strip_quotes(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule_for(text: &str) -> Option<&'static str> {
        classify_with_rule(text).map(|(rule, _)| rule)
    }

    #[test]
    fn priority_create_beats_generic_create() {
        let (rule, intent) =
            classify_with_rule("create a high priority task to fix login").expect("match");
        assert_eq!(rule, "create-with-priority");
        assert_eq!(
            intent,
            Intent::CreateTask {
                description: "fix login".to_string(),
                priority: Some(Priority::High),
            }
        );
    }

    #[test]
    fn generic_create_has_no_priority() {
        assert_eq!(
            classify("Add a new task: write release notes."),
            Some(Intent::CreateTask {
                description: "write release notes".to_string(),
                priority: None,
            })
        );
    }

    #[test]
    fn create_without_description_is_not_a_create() {
        assert_eq!(rule_for("create a task"), None);
        assert_eq!(rule_for("create a critical task"), None);
    }

    #[test]
    fn initialize_accepts_project_suffix() {
        assert_eq!(rule_for("Initialize task tracking for this project"), Some("initialize"));
        assert_eq!(rule_for("set up task tracking"), Some("initialize"));
        assert_eq!(
            rule_for("could you please initialize task tracking now"),
            Some("initialize-keyword")
        );
    }

    #[test]
    fn scan_todos_captures_optional_pattern() {
        assert_eq!(classify("scan for todos"), Some(Intent::ScanTodos { pattern: None }));
        assert_eq!(
            classify("create tasks from TODOs in src/**/*.rs"),
            Some(Intent::ScanTodos {
                pattern: Some("src/**/*.rs".to_string())
            })
        );
        assert_eq!(
            classify("find todo comments in `lib/*.ts`"),
            Some(Intent::ScanTodos {
                pattern: Some("lib/*.ts".to_string())
            })
        );
    }

    #[test]
    fn priority_query_filters_list() {
        assert_eq!(
            classify("What tasks are critical priority?"),
            Some(Intent::ListTasks {
                filter: TaskFilter {
                    priority: Some(Priority::Critical),
                    ..Default::default()
                }
            })
        );
    }

    #[test]
    fn mark_complete_extracts_upper_case_id() {
        assert_eq!(
            classify("mark task task-012 as complete"),
            Some(Intent::MarkComplete {
                task_id: Some("TASK-012".to_string())
            })
        );
        assert_eq!(
            classify("mark it as done"),
            Some(Intent::MarkComplete { task_id: None })
        );
    }

    #[test]
    fn change_priority_accepts_both_phrasings() {
        let expected = Intent::ChangePriority {
            task_id: Some("TASK-003".to_string()),
            priority: Some(Priority::Low),
        };
        assert_eq!(classify("mark task TASK-003 as low priority"), Some(expected.clone()));
        assert_eq!(
            classify("change TASK-003 priority from high to low"),
            Some(expected)
        );
        assert_eq!(
            classify("change the priority of TASK-003"),
            Some(Intent::ChangePriority {
                task_id: Some("TASK-003".to_string()),
                priority: None,
            })
        );
    }

    #[test]
    fn parse_requirements_captures_file() {
        assert_eq!(
            classify("parse docs/requirements.md and create tasks"),
            Some(Intent::ParseRequirements {
                file: Some("docs/requirements.md".to_string())
            })
        );
    }

    #[test]
    fn decompose_enrich_next_and_prioritize() {
        assert_eq!(
            classify("break TASK-004 into subtasks"),
            Some(Intent::DecomposeTask {
                task_id: Some("TASK-004".to_string())
            })
        );
        assert_eq!(
            classify("enrich TASK-002 with context"),
            Some(Intent::EnrichTask {
                task_id: Some("TASK-002".to_string())
            })
        );
        assert_eq!(classify("what task should I work on next"), Some(Intent::RecommendNext));
        assert_eq!(classify("show me what to work on next"), Some(Intent::RecommendNext));
        assert_eq!(classify("prioritize my tasks"), Some(Intent::PrioritizeTasks));
        assert_eq!(
            classify("create subtasks for TASK-005"),
            Some(Intent::DecomposeTask {
                task_id: Some("TASK-005".to_string())
            })
        );
    }

    #[test]
    fn reading_subtasks_is_not_a_decomposition() {
        for text in ["show subtasks for TASK-001", "list the subtasks for TASK-001"] {
            let (rule, intent) = classify_with_rule(text).expect("classified");
            assert_eq!(rule, "list", "{text}");
            assert!(matches!(intent, Intent::ListTasks { .. }), "{text}: {intent:?}");
        }
    }

    #[test]
    fn create_verb_must_lead_the_request() {
        assert_eq!(
            classify("scan for todos and create a task for each"),
            Some(Intent::ScanTodos { pattern: None })
        );
        assert_eq!(
            classify("scan for TODOs in src/** and create tasks"),
            Some(Intent::ScanTodos {
                pattern: Some("src/**".to_string())
            })
        );
        assert_eq!(
            classify("please create a task to update the changelog"),
            Some(Intent::CreateTask {
                description: "update the changelog".to_string(),
                priority: None,
            })
        );
    }

    #[test]
    fn list_parses_filters() {
        assert_eq!(
            classify("list tasks with high priority"),
            Some(Intent::ListTasks {
                filter: TaskFilter {
                    priority: Some(Priority::High),
                    ..Default::default()
                }
            })
        );
        assert_eq!(
            classify("show tasks with status in-progress"),
            Some(Intent::ListTasks {
                filter: TaskFilter {
                    status: Some(Status::InProgress),
                    ..Default::default()
                }
            })
        );
        assert_eq!(
            classify("show completed tasks"),
            Some(Intent::ListTasks {
                filter: TaskFilter {
                    completed: Some(true),
                    ..Default::default()
                }
            })
        );
        assert_eq!(
            classify("list open tasks"),
            Some(Intent::ListTasks {
                filter: TaskFilter {
                    completed: Some(false),
                    ..Default::default()
                }
            })
        );
    }

    #[test]
    fn unrelated_text_is_unclassified() {
        assert_eq!(classify("how do I write a good commit message?"), None);
        assert_eq!(classify("   "), None);
    }
}
