//! Task operations.
//!
//! Every mutating operation is a whole-collection read-modify-write against
//! the session's store. Mirrors are written after the JSON and their failures
//! are only logged.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::completion::{complete_text, ChatMessage, CompletionError, CompletionOptions};
use crate::extract::ai::{analyze_decomposition, AiExtractor};
use crate::extract::requirements::RequirementsParser;
use crate::extract::todo::{exclude_patterns, ScanError, TodoCommentExtractor, TodoScanner};
use crate::extract::{ExtractError, Extractor, FirstNonEmpty, TaskCandidate};
use crate::intent::{Intent, TaskFilter};
use crate::mirror::write_mirror;
use crate::priority::Priority;
use crate::reply;
use crate::session::Session;
use crate::store::{next_id, InitError, InitOutcome, StoreError};
use crate::task::{
    now_timestamp, title_from_text, EnrichedContent, EnrichmentKind, SourceContext, Task,
    TaskCollection, TaskSource,
};

pub const TAG_CODE_TODO: &str = "code-todo";
pub const TAG_REQUIREMENT: &str = "requirement";
pub const TAG_SUBTASK: &str = "subtask";

const ENRICH_INSTRUCTION: &str = "You help developers understand tasks. Rewrite the task below as a \
clear, actionable description of two to four sentences, using the supporting context when it is \
relevant. Respond with the description only.";

#[derive(Debug, Error)]
pub enum OpError {
    #[error("Task {0} not found")]
    NotFound(String),
    #[error("Missing {0}")]
    MissingParameter(&'static str),
    #[error("Task tracking is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("Could not read {path}: {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid file pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("Model call aborted")]
    Aborted,
}

impl From<ExtractError> for OpError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Aborted => OpError::Aborted,
        }
    }
}

impl From<ScanError> for OpError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Pattern { pattern, source } => OpError::InvalidPattern {
                pattern,
                message: source.to_string(),
            },
            ScanError::Extract(err) => err.into(),
        }
    }
}

impl OpError {
    /// The message shown in chat, with what to do next where that helps.
    pub fn user_message(&self) -> String {
        match self {
            OpError::NotFound(id) => format!(
                "Task {} not found. Use \"list tasks\" to see the available task ids.",
                id
            ),
            OpError::MissingParameter(what) => format!(
                "Please specify {}. Say \"help\" to see example commands.",
                what
            ),
            OpError::NotInitialized => "Task tracking is not initialized for this workspace. \
Run \"initialize task tracking\" first."
                .to_string(),
            OpError::Store(err) => format!(
                "Could not save tasks: {}. Check that the tasks directory is writable.",
                err
            ),
            OpError::Init(err) => format!("Failed to initialize task tracking. {}.", err),
            OpError::ReadSource { path, source } => {
                format!("Could not read {}: {}. Check the file path and try again.", path.display(), source)
            }
            OpError::InvalidPattern { pattern, message } => {
                format!("The file pattern {} is not valid ({}).", pattern, message)
            }
            OpError::Aborted => "The model call was aborted. Please try again.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskListing {
    pub filter: TaskFilter,
    /// Sorted by priority, critical first.
    pub open: Vec<Task>,
    pub completed: Vec<Task>,
    /// Size of the whole collection, before filtering.
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkDoneOutcome {
    Completed(Task),
    AlreadyCompleted(Task),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriorityChange {
    pub task: Task,
    pub previous: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrioritizeSummary {
    pub open: Vec<Task>,
    pub completed: usize,
    pub reordered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recommendation {
    NoTasks,
    AllDone { completed: usize },
    Next {
        task: Task,
        /// Other open tasks sharing the recommended task's priority.
        same_priority: usize,
        open_by_priority: Vec<(Priority, usize)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    Atomic(Task),
    Split { parent: Task, subtasks: Vec<Task> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub pattern: String,
    pub files_scanned: usize,
    pub created: Vec<Task>,
    pub already_tracked: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseSummary {
    pub file: String,
    pub created: Vec<Task>,
}

pub struct TaskEngine<'a> {
    session: &'a Session,
}

impl<'a> TaskEngine<'a> {
    pub fn new(session: &'a Session) -> Self {
        TaskEngine { session }
    }

    /// Runs one intent and turns the outcome, good or bad, into chat text.
    pub async fn execute(&self, intent: &Intent, cancel: &CancellationToken) -> String {
        let result = match intent {
            Intent::InitializeTracking => self.initialize().map(|outcome| reply::initialized(&outcome)),
            Intent::CreateTask {
                description,
                priority,
            } => self
                .create_task(description, *priority)
                .map(|task| reply::created(&task)),
            Intent::ListTasks { filter } => self.list_tasks(filter).map(|listing| reply::listing(&listing)),
            Intent::MarkComplete { task_id } => self
                .mark_done(task_id.as_deref())
                .map(|outcome| reply::marked_done(&outcome)),
            Intent::ChangePriority { task_id, priority } => self
                .change_priority(task_id.as_deref(), *priority)
                .map(|change| reply::priority_changed(&change)),
            Intent::PrioritizeTasks => self.prioritize().map(|summary| reply::prioritized(&summary)),
            Intent::RecommendNext => self.recommend_next().map(|rec| reply::recommendation(&rec)),
            Intent::DecomposeTask { task_id } => self
                .decompose(task_id.as_deref(), cancel)
                .await
                .map(|outcome| reply::decomposition(&outcome)),
            Intent::EnrichTask { task_id } => self
                .enrich(task_id.as_deref(), cancel)
                .await
                .map(|task| reply::enriched(&task)),
            Intent::ScanTodos { pattern } => self
                .scan_todos(pattern.as_deref(), cancel)
                .await
                .map(|summary| reply::scanned(&summary)),
            Intent::ParseRequirements { file } => self
                .parse_requirements(file.as_deref(), cancel)
                .await
                .map(|summary| reply::parsed(&summary)),
        };
        result.unwrap_or_else(|err| {
            tracing::debug!(intent = intent.name(), error = %err, "operation failed");
            err.user_message()
        })
    }

    pub fn initialize(&self) -> Result<InitOutcome, OpError> {
        Ok(self.session.store.initialize()?)
    }

    pub fn create_task(&self, description: &str, priority: Option<Priority>) -> Result<Task, OpError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(OpError::MissingParameter("a task description"));
        }
        let priority = priority.unwrap_or(self.session.settings.default_priority);
        let mut collection = self.session.store.load();
        let task = Task::new(
            next_id(&collection),
            &title_from_text(description),
            description,
            priority,
        );
        collection.tasks.push(task.clone());
        self.save(&collection)?;
        tracing::info!(id = %task.id, %priority, "created task");
        self.refresh_mirror(&task);
        Ok(task)
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskListing, OpError> {
        self.require_initialized()?;
        let collection = self.session.store.load();
        let total = collection.tasks.len();
        let matching = filter_tasks(&collection.tasks, filter);
        let (open, completed): (Vec<Task>, Vec<Task>) =
            matching.into_iter().cloned().partition(|task| !task.completed);
        Ok(TaskListing {
            filter: filter.clone(),
            open: sort_by_priority(open),
            completed,
            total,
        })
    }

    pub fn mark_done(&self, task_id: Option<&str>) -> Result<MarkDoneOutcome, OpError> {
        let task_id = task_id.ok_or(OpError::MissingParameter("a task id such as TASK-001"))?;
        let mut collection = self.session.store.load();
        let task = collection
            .find_mut(task_id)
            .ok_or_else(|| OpError::NotFound(task_id.to_string()))?;
        if task.completed {
            return Ok(MarkDoneOutcome::AlreadyCompleted(task.clone()));
        }
        task.mark_completed();
        let task = task.clone();
        self.save(&collection)?;
        tracing::info!(id = %task.id, "marked task completed");
        self.refresh_mirror(&task);
        Ok(MarkDoneOutcome::Completed(task))
    }

    pub fn change_priority(
        &self,
        task_id: Option<&str>,
        priority: Option<Priority>,
    ) -> Result<PriorityChange, OpError> {
        let task_id = task_id.ok_or(OpError::MissingParameter("a task id such as TASK-001"))?;
        let priority =
            priority.ok_or(OpError::MissingParameter("a priority (critical, high, medium or low)"))?;
        let mut collection = self.session.store.load();
        let task = collection
            .find_mut(task_id)
            .ok_or_else(|| OpError::NotFound(task_id.to_string()))?;
        let previous = task.priority.replace(priority);
        let task = task.clone();
        self.save(&collection)?;
        tracing::info!(id = %task.id, %priority, "changed task priority");
        self.refresh_mirror(&task);
        Ok(PriorityChange { task, previous })
    }

    pub fn prioritize(&self) -> Result<PrioritizeSummary, OpError> {
        self.require_initialized()?;
        let mut collection = self.session.store.load();
        let before: Vec<String> = collection.tasks.iter().map(|task| task.id.clone()).collect();
        prioritize_collection(&mut collection);
        let reordered = collection
            .tasks
            .iter()
            .map(|task| &task.id)
            .ne(before.iter());
        self.save(&collection)?;
        tracing::info!(reordered, tasks = collection.tasks.len(), "prioritized tasks");
        let (open, completed): (Vec<Task>, Vec<Task>) =
            collection.tasks.into_iter().partition(|task| !task.completed);
        Ok(PrioritizeSummary {
            open,
            completed: completed.len(),
            reordered,
        })
    }

    pub fn recommend_next(&self) -> Result<Recommendation, OpError> {
        self.require_initialized()?;
        let collection = self.session.store.load();
        Ok(recommend(&collection))
    }

    pub async fn decompose(
        &self,
        task_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Decomposition, OpError> {
        let task_id = task_id.ok_or(OpError::MissingParameter("the id of the task to break down"))?;
        let mut collection = self.session.store.load();
        let parent = collection
            .find(task_id)
            .cloned()
            .ok_or_else(|| OpError::NotFound(task_id.to_string()))?;

        let proposed = analyze_decomposition(self.session.completion.as_ref(), &parent, cancel).await?;
        if proposed.is_empty() {
            return Ok(Decomposition::Atomic(parent));
        }

        let mut subtasks = Vec::with_capacity(proposed.len());
        for candidate in &proposed {
            let mut subtask = task_from_candidate(&collection, candidate);
            subtask.parent_task_id = Some(parent.id.clone());
            subtask.add_tag(TAG_SUBTASK);
            for tag in &parent.tags {
                subtask.add_tag(tag);
            }
            collection.tasks.push(subtask.clone());
            subtasks.push(subtask);
        }
        let parent = {
            let stored = collection
                .find_mut(&parent.id)
                .ok_or_else(|| OpError::NotFound(parent.id.clone()))?;
            stored.subtasks.extend(subtasks.iter().map(|task| task.id.clone()));
            stored.clone()
        };
        self.save(&collection)?;
        tracing::info!(id = %parent.id, subtasks = subtasks.len(), "decomposed task");
        self.refresh_mirror(&parent);
        for subtask in &subtasks {
            self.refresh_mirror(subtask);
        }
        Ok(Decomposition::Split { parent, subtasks })
    }

    pub async fn enrich(&self, task_id: Option<&str>, cancel: &CancellationToken) -> Result<Task, OpError> {
        let task_id = task_id.ok_or(OpError::MissingParameter("the id of the task to enrich"))?;
        let task = self
            .session
            .store
            .load()
            .find(task_id)
            .cloned()
            .ok_or_else(|| OpError::NotFound(task_id.to_string()))?;

        let from_requirements = task
            .source
            .as_ref()
            .and_then(|source| source.context)
            == Some(SourceContext::Requirements);
        let (kind, context) = if from_requirements {
            (
                EnrichmentKind::Requirements,
                self.session.context.requirements_context(&task).await,
            )
        } else {
            (EnrichmentKind::Code, self.session.context.code_context(&task).await)
        };
        let context = context.unwrap_or_default();
        let description = self.enriched_description(&task, &context, cancel).await?;

        // The model call can take a while; re-read so concurrent edits survive.
        let mut collection = self.session.store.load();
        let stored = collection
            .find_mut(&task.id)
            .ok_or_else(|| OpError::NotFound(task.id.clone()))?;
        stored.enriched_content = Some(EnrichedContent {
            description,
            context,
            enriched_at: now_timestamp(),
            kind,
        });
        let task = stored.clone();
        self.save(&collection)?;
        tracing::info!(id = %task.id, kind = kind.as_str(), "enriched task");
        self.refresh_mirror(&task);
        Ok(task)
    }

    async fn enriched_description(
        &self,
        task: &Task,
        context: &str,
        cancel: &CancellationToken,
    ) -> Result<String, OpError> {
        let mut prompt = format!("Task {}: {}\n\n{}", task.id, task.title, task.description_or_title());
        if !context.trim().is_empty() {
            prompt.push_str("\n\nSupporting context:\n");
            prompt.push_str(context);
        }
        let messages = [ChatMessage::user(ENRICH_INSTRUCTION), ChatMessage::user(prompt)];
        let options = CompletionOptions::justified("enrichment");
        match complete_text(self.session.completion.as_ref(), &messages, &options, cancel).await {
            Ok(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Ok(_) => Ok(task.description_or_title().to_string()),
            Err(CompletionError::Aborted) => Err(OpError::Aborted),
            Err(err) => {
                tracing::warn!(id = %task.id, error = %err, "enrichment without AI description");
                Ok(task.description_or_title().to_string())
            }
        }
    }

    pub async fn scan_todos(
        &self,
        pattern: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary, OpError> {
        let settings = &self.session.settings;
        let root = self.session.workspace_root();
        let pattern = pattern
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(settings.todo_pattern.as_str())
            .to_string();

        let comments = TodoCommentExtractor::new(settings.default_priority);
        let ai = AiExtractor::code_comments(self.session.completion.as_ref(), cancel.clone());
        let mut scanner = TodoScanner::new(root, &pattern, &comments, self.session.progress.as_ref())
            .with_excludes(exclude_patterns(root, &settings.tasks_dir));
        if settings.todo_ai_fallback {
            scanner = scanner.with_fallback(&ai);
        }
        let report = scanner.scan().await?;

        let mut collection = self.session.store.load();
        let mut created = Vec::new();
        let mut already_tracked = 0;
        for found in &report.matches {
            if is_tracked(&collection, &found.file, &found.candidate) {
                already_tracked += 1;
                continue;
            }
            let mut task = task_from_candidate(&collection, &found.candidate);
            task.add_tag(TAG_CODE_TODO);
            task.source = Some(TaskSource {
                file: found.file.clone(),
                line: found.candidate.line,
                context: Some(SourceContext::Todo),
            });
            collection.tasks.push(task.clone());
            created.push(task);
        }
        if !created.is_empty() {
            self.save(&collection)?;
            for task in &created {
                self.refresh_mirror(task);
            }
        }
        tracing::info!(
            files = report.files_scanned,
            created = created.len(),
            already_tracked,
            "TODO scan finished"
        );
        Ok(ScanSummary {
            pattern,
            files_scanned: report.files_scanned,
            created,
            already_tracked,
        })
    }

    pub async fn parse_requirements(
        &self,
        file: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ParseSummary, OpError> {
        let file = file
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(OpError::MissingParameter("the requirements file to parse"))?;
        let path = resolve_in_workspace(self.session.workspace_root(), file);
        let content = fs::read_to_string(&path).map_err(|source| OpError::ReadSource {
            path: path.clone(),
            source,
        })?;

        let parser = RequirementsParser;
        let ai = AiExtractor::requirements(self.session.completion.as_ref(), cancel.clone());
        let candidates = FirstNonEmpty::new(vec![&parser as &dyn Extractor, &ai])
            .extract(&content)
            .await?;

        let mut collection = self.session.store.load();
        let mut created = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let mut task = task_from_candidate(&collection, candidate);
            task.add_tag(TAG_REQUIREMENT);
            task.source = Some(TaskSource {
                file: file.to_string(),
                line: candidate.line,
                context: Some(SourceContext::Requirements),
            });
            collection.tasks.push(task.clone());
            created.push(task);
        }
        if !created.is_empty() {
            self.save(&collection)?;
            for task in &created {
                self.refresh_mirror(task);
            }
        }
        tracing::info!(file, created = created.len(), "parsed requirements");
        Ok(ParseSummary {
            file: file.to_string(),
            created,
        })
    }

    fn require_initialized(&self) -> Result<(), OpError> {
        if self.session.store.is_initialized() {
            Ok(())
        } else {
            Err(OpError::NotInitialized)
        }
    }

    fn save(&self, collection: &TaskCollection) -> Result<(), OpError> {
        Ok(self.session.store.save(collection)?)
    }

    fn refresh_mirror(&self, task: &Task) {
        if !self.session.settings.markdown_mirrors {
            return;
        }
        if let Err(err) = write_mirror(self.session.store.tasks_dir(), task) {
            tracing::warn!(id = %task.id, error = %err, "failed to update markdown mirror");
        }
    }
}

pub fn filter_tasks<'a>(tasks: &'a [Task], filter: &TaskFilter) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| {
            filter
                .priority
                .map_or(true, |priority| task.effective_priority() == priority)
        })
        .filter(|task| filter.completed.map_or(true, |completed| task.completed == completed))
        .filter(|task| filter.status.map_or(true, |status| task.status == status))
        .collect()
}

/// Stable: tasks of equal priority keep their stored order.
pub fn sort_by_priority(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by_key(Task::priority_rank);
    tasks
}

/// Open tasks first, each group ordered by priority. Applying it twice gives
/// the same order as applying it once.
pub fn prioritize_collection(collection: &mut TaskCollection) {
    collection
        .tasks
        .sort_by_key(|task| (task.completed, task.priority_rank()));
}

pub fn recommend(collection: &TaskCollection) -> Recommendation {
    if collection.tasks.is_empty() {
        return Recommendation::NoTasks;
    }
    let open = sort_by_priority(collection.open_tasks().cloned().collect());
    let Some(task) = open.first().cloned() else {
        return Recommendation::AllDone {
            completed: collection.tasks.len(),
        };
    };
    let priority = task.effective_priority();
    let open_by_priority = priority_counts(&open);
    let same_priority = open
        .iter()
        .filter(|other| other.effective_priority() == priority)
        .count()
        - 1;
    Recommendation::Next {
        task,
        same_priority,
        open_by_priority,
    }
}

/// Count per priority level, critical first, zero counts included.
pub fn priority_counts(tasks: &[Task]) -> Vec<(Priority, usize)> {
    Priority::ALL
        .iter()
        .map(|priority| {
            (
                *priority,
                tasks
                    .iter()
                    .filter(|task| task.effective_priority() == *priority)
                    .count(),
            )
        })
        .collect()
}

fn task_from_candidate(collection: &TaskCollection, candidate: &TaskCandidate) -> Task {
    Task::new(
        next_id(collection),
        &title_from_text(&candidate.description),
        &candidate.description,
        candidate.priority,
    )
}

/// A TODO is already tracked when a task points at the same file and line
/// with the same text.
fn is_tracked(collection: &TaskCollection, file: &str, candidate: &TaskCandidate) -> bool {
    collection.tasks.iter().any(|task| {
        task.source.as_ref().is_some_and(|source| {
            source.context == Some(SourceContext::Todo)
                && source.file == file
                && source.line == candidate.line
                && task.description == candidate.description
        })
    })
}

fn resolve_in_workspace(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::priority::Status;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn session(temp: &TempDir) -> Session {
        Session::new(temp.path(), Settings::default())
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    #[test]
    fn create_uses_default_priority_and_sequential_ids() {
        let temp = TempDir::new().expect("tempdir");
        let session = session(&temp);
        let engine = TaskEngine::new(&session);
        let first = engine.create_task("Write docs", None).expect("create");
        let second = engine.create_task("Fix login", Some(Priority::High)).expect("create");
        assert_eq!(first.id, "TASK-001");
        assert_eq!(first.priority, Some(Priority::Medium));
        assert_eq!(second.id, "TASK-002");
        assert_eq!(second.priority, Some(Priority::High));
        assert!(session.store.mirror_path("TASK-002").is_file());
    }

    #[test]
    fn create_requires_description() {
        let temp = TempDir::new().expect("tempdir");
        let session = session(&temp);
        let err = TaskEngine::new(&session).create_task("   ", None).expect_err("empty");
        assert!(matches!(err, OpError::MissingParameter(_)));
    }

    #[test]
    fn list_sorts_open_by_priority_and_keeps_completed_apart() {
        let temp = TempDir::new().expect("tempdir");
        let session = session(&temp);
        let engine = TaskEngine::new(&session);
        engine.initialize().expect("init");
        engine.create_task("low one", Some(Priority::Low)).expect("create");
        engine.create_task("critical one", Some(Priority::Critical)).expect("create");
        engine.create_task("medium one", None).expect("create");
        engine.create_task("high done", Some(Priority::High)).expect("create");
        engine.mark_done(Some("task-004")).expect("done");

        let listing = engine.list_tasks(&TaskFilter::default()).expect("list");
        assert_eq!(ids(&listing.open), vec!["TASK-002", "TASK-003", "TASK-001"]);
        assert_eq!(ids(&listing.completed), vec!["TASK-004"]);

        let filter = TaskFilter {
            priority: Some(Priority::Low),
            ..Default::default()
        };
        let listing = engine.list_tasks(&filter).expect("list");
        assert_eq!(ids(&listing.open), vec!["TASK-001"]);
    }

    #[test]
    fn list_without_store_asks_for_initialization() {
        let temp = TempDir::new().expect("tempdir");
        let session = session(&temp);
        let err = TaskEngine::new(&session)
            .list_tasks(&TaskFilter::default())
            .expect_err("not initialized");
        assert!(matches!(err, OpError::NotInitialized));
        assert!(err.user_message().contains("initialize task tracking"));
    }

    #[test]
    fn mark_done_unknown_id_does_not_write() {
        let temp = TempDir::new().expect("tempdir");
        let session = session(&temp);
        let engine = TaskEngine::new(&session);
        engine.create_task("Something", None).expect("create");
        let path = session.store.collection_path();
        let before = fs::read_to_string(&path).expect("read");

        let err = engine.mark_done(Some("TASK-999")).expect_err("missing");
        assert!(matches!(err, OpError::NotFound(ref id) if id == "TASK-999"));
        assert_eq!(fs::read_to_string(&path).expect("read"), before);
    }

    #[test]
    fn mark_done_sets_completion_fields_once() {
        let temp = TempDir::new().expect("tempdir");
        let session = session(&temp);
        let engine = TaskEngine::new(&session);
        engine.create_task("Ship it", None).expect("create");

        let MarkDoneOutcome::Completed(task) = engine.mark_done(Some("TASK-001")).expect("done") else {
            panic!("expected completion");
        };
        assert!(task.completed);
        assert_eq!(task.status, Status::Completed);
        assert!(task.completed_at.is_some());

        let again = engine.mark_done(Some("TASK-001")).expect("done again");
        assert!(matches!(again, MarkDoneOutcome::AlreadyCompleted(_)));
    }

    #[test]
    fn change_priority_validates_parameters() {
        let temp = TempDir::new().expect("tempdir");
        let session = session(&temp);
        let engine = TaskEngine::new(&session);
        engine.create_task("Tune cache", None).expect("create");

        assert!(matches!(
            engine.change_priority(None, Some(Priority::High)),
            Err(OpError::MissingParameter(_))
        ));
        assert!(matches!(
            engine.change_priority(Some("TASK-001"), None),
            Err(OpError::MissingParameter(_))
        ));
        assert!(matches!(
            engine.change_priority(Some("TASK-404"), Some(Priority::High)),
            Err(OpError::NotFound(_))
        ));
        let change = engine
            .change_priority(Some("TASK-001"), Some(Priority::Critical))
            .expect("change");
        assert_eq!(change.previous, Some(Priority::Medium));
        assert_eq!(session.store.load().tasks[0].priority, Some(Priority::Critical));
    }

    #[test]
    fn prioritize_is_idempotent() {
        let mut collection = TaskCollection::empty();
        for (id, priority, done) in [
            ("TASK-001", Priority::Low, false),
            ("TASK-002", Priority::Critical, true),
            ("TASK-003", Priority::High, false),
            ("TASK-004", Priority::Low, false),
        ] {
            let mut task = Task::new(id, id, "", priority);
            if done {
                task.mark_completed();
            }
            collection.tasks.push(task);
        }
        prioritize_collection(&mut collection);
        let once = ids(&collection.tasks).into_iter().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(once, vec!["TASK-003", "TASK-001", "TASK-004", "TASK-002"]);
        prioritize_collection(&mut collection);
        assert_eq!(ids(&collection.tasks), once);
    }

    #[test]
    fn recommend_reports_head_and_counts() {
        let mut collection = TaskCollection::empty();
        assert_eq!(recommend(&collection), Recommendation::NoTasks);

        collection.tasks.push(Task::new("TASK-001", "a", "", Priority::Medium));
        collection.tasks.push(Task::new("TASK-002", "b", "", Priority::High));
        collection.tasks.push(Task::new("TASK-003", "c", "", Priority::High));
        let Recommendation::Next {
            task,
            same_priority,
            open_by_priority,
        } = recommend(&collection)
        else {
            panic!("expected a recommendation");
        };
        assert_eq!(task.id, "TASK-002");
        assert_eq!(same_priority, 1);
        assert_eq!(
            open_by_priority,
            vec![
                (Priority::Critical, 0),
                (Priority::High, 2),
                (Priority::Medium, 1),
                (Priority::Low, 0),
            ]
        );

        for task in &mut collection.tasks {
            task.mark_completed();
        }
        assert_eq!(recommend(&collection), Recommendation::AllDone { completed: 3 });
    }

    #[test]
    fn unspecified_priority_sorts_as_medium() {
        let mut unspecified = Task::new("TASK-001", "a", "", Priority::Low);
        unspecified.priority = None;
        let low = Task::new("TASK-002", "b", "", Priority::Low);
        let high = Task::new("TASK-003", "c", "", Priority::High);
        let sorted = sort_by_priority(vec![low, unspecified, high]);
        assert_eq!(ids(&sorted), vec!["TASK-003", "TASK-001", "TASK-002"]);
    }
}
