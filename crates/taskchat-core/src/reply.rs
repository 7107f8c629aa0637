//! Chat replies for operation outcomes.

use crate::intent::TaskFilter;
use crate::ops::{
    Decomposition, MarkDoneOutcome, ParseSummary, PrioritizeSummary, PriorityChange,
    Recommendation, ScanSummary, TaskListing,
};
use crate::priority::Status;
use crate::store::InitOutcome;
use crate::task::Task;

/// Completed tasks shown at the end of a listing before the remainder is
/// summarised.
pub const COMPLETED_TAIL: usize = 5;

/// Tasks listed individually in scan and parse summaries.
const CREATED_PREVIEW: usize = 10;

pub fn task_line(task: &Task) -> String {
    let mut line = format!("- **{}** [{}] {}", task.id, task.effective_priority(), task.title);
    if !task.completed && task.status != Status::Todo {
        line.push_str(&format!(" _({})_", task.status));
    }
    line
}

fn completed_line(task: &Task) -> String {
    format!("- ~~{}~~ {}", task.id, task.title)
}

pub fn initialized(outcome: &InitOutcome) -> String {
    match outcome {
        InitOutcome::Created { path } => format!(
            "Task tracking initialized. Tasks are stored in `{}`.\n\nTry \"create a high priority task to ...\" or \"scan for todos\".",
            path.display()
        ),
        InitOutcome::AlreadyInitialized { path, task_count } => format!(
            "Task tracking is already initialized (`{}`, {} task{}).",
            path.display(),
            task_count,
            plural(*task_count)
        ),
    }
}

pub fn created(task: &Task) -> String {
    format!(
        "Created **{}** with {} priority: {}",
        task.id,
        task.effective_priority(),
        task.title
    )
}

pub fn listing(listing: &TaskListing) -> String {
    if listing.total == 0 {
        return "No tasks yet. Create one with \"create a task to ...\".".to_string();
    }
    if listing.open.is_empty() && listing.completed.is_empty() {
        return format!("No tasks match {}.", describe_filter(&listing.filter));
    }

    let mut out = Vec::new();
    if listing.filter.completed != Some(true) {
        out.push(format!("## Open Tasks ({})", listing.open.len()));
        if listing.open.is_empty() {
            out.push("Nothing open.".to_string());
        }
        out.extend(listing.open.iter().map(task_line));
    }
    if !listing.completed.is_empty() {
        if !out.is_empty() {
            out.push(String::new());
        }
        out.push(format!("## Completed Tasks ({})", listing.completed.len()));
        out.extend(listing.completed.iter().take(COMPLETED_TAIL).map(completed_line));
        if listing.completed.len() > COMPLETED_TAIL {
            out.push(format!(
                "… and {} more completed tasks",
                listing.completed.len() - COMPLETED_TAIL
            ));
        }
    }
    out.join("\n")
}

fn describe_filter(filter: &TaskFilter) -> String {
    let mut parts = Vec::new();
    if let Some(priority) = filter.priority {
        parts.push(format!("{} priority", priority));
    }
    if let Some(status) = filter.status {
        parts.push(format!("status {}", status));
    }
    match filter.completed {
        Some(true) => parts.push("completed".to_string()),
        Some(false) => parts.push("open".to_string()),
        None => {}
    }
    if parts.is_empty() {
        "that filter".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn marked_done(outcome: &MarkDoneOutcome) -> String {
    match outcome {
        MarkDoneOutcome::Completed(task) => {
            format!("Marked **{}** as completed: {}", task.id, task.title)
        }
        MarkDoneOutcome::AlreadyCompleted(task) => {
            format!("**{}** is already completed.", task.id)
        }
    }
}

pub fn priority_changed(change: &PriorityChange) -> String {
    let now = change.task.effective_priority();
    match change.previous {
        Some(previous) if previous != now => format!(
            "Changed **{}** priority from {} to {}.",
            change.task.id, previous, now
        ),
        _ => format!("**{}** now has {} priority.", change.task.id, now),
    }
}

pub fn prioritized(summary: &PrioritizeSummary) -> String {
    let mut out = vec![if summary.reordered {
        format!(
            "Tasks reordered by priority: {} open, {} completed.",
            summary.open.len(),
            summary.completed
        )
    } else {
        format!(
            "Tasks were already in priority order ({} open, {} completed).",
            summary.open.len(),
            summary.completed
        )
    }];
    if !summary.open.is_empty() {
        out.push(String::new());
        out.extend(summary.open.iter().map(task_line));
    }
    out.join("\n")
}

pub fn recommendation(rec: &Recommendation) -> String {
    match rec {
        Recommendation::NoTasks => {
            "There are no tasks yet. Create one with \"create a task to ...\".".to_string()
        }
        Recommendation::AllDone { completed } => format!(
            "All tasks are completed ({} done). Nothing left to work on.",
            completed
        ),
        Recommendation::Next {
            task,
            same_priority,
            open_by_priority,
        } => {
            let mut out = vec![
                format!(
                    "Work on **{}** next ({} priority): {}",
                    task.id,
                    task.effective_priority(),
                    task.title
                ),
            ];
            if task.description_or_title() != task.title {
                out.push(String::new());
                out.push(task.description_or_title().to_string());
            }
            out.push(String::new());
            if *same_priority > 0 {
                out.push(format!(
                    "{} other {} priority task{} also waiting.",
                    same_priority,
                    task.effective_priority(),
                    if *same_priority == 1 { " is" } else { "s are" }
                ));
            }
            let summary = open_by_priority
                .iter()
                .map(|(priority, count)| format!("{} {}", priority, count))
                .collect::<Vec<_>>()
                .join(", ");
            out.push(format!("Open tasks by priority: {}", summary));
            out.join("\n")
        }
    }
}

pub fn decomposition(outcome: &Decomposition) -> String {
    match outcome {
        Decomposition::Atomic(task) => format!(
            "**{}** looks atomic; no decomposition needed.",
            task.id
        ),
        Decomposition::Split { parent, subtasks } => {
            let mut out = vec![format!(
                "Broke **{}** into {} subtask{}:",
                parent.id,
                subtasks.len(),
                plural(subtasks.len())
            )];
            out.extend(subtasks.iter().map(task_line));
            out.join("\n")
        }
    }
}

pub fn enriched(task: &Task) -> String {
    let Some(enriched) = &task.enriched_content else {
        return format!("**{}** was not enriched.", task.id);
    };
    let mut out = vec![
        format!(
            "Enriched **{}** with {} context.",
            task.id,
            enriched.kind.as_str()
        ),
        String::new(),
        enriched.description.clone(),
    ];
    if enriched.context.trim().is_empty() {
        out.push(String::new());
        out.push("_No supporting context was found._".to_string());
    }
    out.join("\n")
}

pub fn scanned(summary: &ScanSummary) -> String {
    if summary.created.is_empty() {
        let mut text = format!(
            "No new TODOs found in {} file{} matching `{}`.",
            summary.files_scanned,
            plural(summary.files_scanned),
            summary.pattern
        );
        if summary.already_tracked > 0 {
            text.push_str(&format!(
                " {} TODO{} already tracked.",
                summary.already_tracked,
                plural(summary.already_tracked)
            ));
        }
        return text;
    }
    let mut out = vec![format!(
        "Created {} task{} from TODO comments in {} file{}:",
        summary.created.len(),
        plural(summary.created.len()),
        summary.files_scanned,
        plural(summary.files_scanned)
    )];
    out.extend(preview(&summary.created));
    if summary.already_tracked > 0 {
        out.push(format!(
            "Skipped {} TODO{} that {} already tracked.",
            summary.already_tracked,
            plural(summary.already_tracked),
            if summary.already_tracked == 1 { "was" } else { "were" }
        ));
    }
    out.join("\n")
}

pub fn parsed(summary: &ParseSummary) -> String {
    if summary.created.is_empty() {
        return format!("No requirements found in `{}`.", summary.file);
    }
    let mut out = vec![format!(
        "Created {} task{} from `{}`:",
        summary.created.len(),
        plural(summary.created.len()),
        summary.file
    )];
    out.extend(preview(&summary.created));
    out.join("\n")
}

fn preview(tasks: &[Task]) -> Vec<String> {
    let mut lines: Vec<String> = tasks.iter().take(CREATED_PREVIEW).map(task_line).collect();
    if tasks.len() > CREATED_PREVIEW {
        lines.push(format!("… and {} more", tasks.len() - CREATED_PREVIEW));
    }
    lines
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
