mod common;

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use taskchat_core::completion::CompletionError;
use taskchat_core::ops::{Decomposition, OpError, TaskEngine};
use taskchat_core::priority::Priority;
use taskchat_core::task::{EnrichmentKind, SourceContext};

use common::{session, session_with, ScriptedCompletion};

#[tokio::test]
async fn scan_todos_creates_tagged_tasks_and_skips_known_ones() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    fs::create_dir_all(root.join("src")).expect("src");
    fs::create_dir_all(root.join("generated")).expect("generated");
    fs::write(
        root.join("src/worker.rs"),
        "fn run() {\n    // TODO(high): fix race condition\n    spawn();\n    // TODO: add retries\n}\n",
    )
    .expect("worker");
    fs::write(root.join("generated/out.rs"), "// TODO: ignored by gitignore\n").expect("generated");
    fs::write(root.join(".gitignore"), "generated/\n").expect("gitignore");

    let session = session(root);
    let engine = TaskEngine::new(&session);
    let cancel = CancellationToken::new();
    let summary = engine.scan_todos(None, &cancel).await.expect("scan");

    assert_eq!(summary.created.len(), 2);
    let race = &summary.created[0];
    assert_eq!(race.title, "fix race condition");
    assert_eq!(race.priority, Some(Priority::High));
    assert_eq!(race.tags, vec!["code-todo".to_string()]);
    let source = race.source.as_ref().expect("source");
    assert_eq!(source.file, "src/worker.rs");
    assert_eq!(source.line, Some(2));
    assert_eq!(source.context, Some(SourceContext::Todo));
    assert_eq!(summary.created[1].priority, Some(Priority::Medium));

    let again = engine.scan_todos(None, &cancel).await.expect("rescan");
    assert!(again.created.is_empty());
    assert_eq!(again.already_tracked, 2);
    assert_eq!(session.store.load().tasks.len(), 2);
}

#[tokio::test]
async fn scan_todos_reports_bad_patterns() {
    let temp = TempDir::new().expect("tempdir");
    let session = session(temp.path());
    let err = TaskEngine::new(&session)
        .scan_todos(Some("src/[unclosed"), &CancellationToken::new())
        .await
        .expect_err("bad glob");
    assert!(matches!(err, OpError::InvalidPattern { .. }));
}

#[tokio::test]
async fn scan_todos_asks_the_model_once_when_no_comments_exist() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    fs::create_dir_all(root.join("src")).expect("src");
    fs::write(
        root.join("src/sync.rs"),
        "fn sync() {\n    // FIXME: handle the offline case\n}\n",
    )
    .expect("sync");
    let completion = ScriptedCompletion::new(vec![Ok(
        "[{\"description\": \"Handle the offline case in sync\", \"priority\": \"high\"}]"
            .to_string(),
    )]);
    let session = session_with(root, completion.clone());

    let summary = TaskEngine::new(&session)
        .scan_todos(None, &CancellationToken::new())
        .await
        .expect("scan");

    assert_eq!(completion.requests().len(), 1);
    assert_eq!(summary.created.len(), 1);
    let task = &summary.created[0];
    assert_eq!(task.description, "Handle the offline case in sync");
    assert_eq!(task.priority, Some(Priority::High));
    assert_eq!(task.tags, vec!["code-todo".to_string()]);
    let source = task.source.as_ref().expect("source");
    assert_eq!(source.file, "src/sync.rs");
    assert_eq!(source.line, None);
    assert_eq!(source.context, Some(SourceContext::Todo));
}

#[tokio::test]
async fn parse_requirements_uses_line_patterns_first() {
    let temp = TempDir::new().expect("tempdir");
    fs::write(
        temp.path().join("REQUIREMENTS.md"),
        "# Auth\n\n- [ ] Add login page\nMUST: encrypt data at rest\n- [ ] ok\n",
    )
    .expect("doc");
    let completion = ScriptedCompletion::new(Vec::new());
    let session = session_with(temp.path(), completion.clone());

    let summary = TaskEngine::new(&session)
        .parse_requirements(Some("REQUIREMENTS.md"), &CancellationToken::new())
        .await
        .expect("parse");

    let found: Vec<(&str, Option<Priority>, Option<usize>)> = summary
        .created
        .iter()
        .map(|task| {
            (
                task.description.as_str(),
                task.priority,
                task.source.as_ref().and_then(|source| source.line),
            )
        })
        .collect();
    assert_eq!(
        found,
        vec![
            ("Add login page", Some(Priority::Medium), Some(3)),
            ("encrypt data at rest", Some(Priority::Critical), Some(4)),
        ]
    );
    assert!(summary.created.iter().all(|task| task.tags == vec!["requirement".to_string()]));
    assert!(completion.requests().is_empty());
}

#[tokio::test]
async fn parse_requirements_falls_back_to_ai() {
    let temp = TempDir::new().expect("tempdir");
    fs::write(
        temp.path().join("notes.txt"),
        "The product lets teams share dashboards. Exports would be nice.",
    )
    .expect("doc");
    let completion = ScriptedCompletion::new(vec![Ok("```json\n[{\"description\": \"Support dashboard sharing\", \"priority\": \"high\"}, {\"description\": \"Docs\", \"priority\": \"low\"}, {\"description\": \"Add CSV export\", \"priority\": \"whenever\"}]\n```".to_string())]);
    let session = session_with(temp.path(), completion.clone());

    let summary = TaskEngine::new(&session)
        .parse_requirements(Some("notes.txt"), &CancellationToken::new())
        .await
        .expect("parse");

    let found: Vec<(&str, Option<Priority>)> = summary
        .created
        .iter()
        .map(|task| (task.description.as_str(), task.priority))
        .collect();
    assert_eq!(
        found,
        vec![
            ("Support dashboard sharing", Some(Priority::High)),
            ("Add CSV export", Some(Priority::Medium)),
        ]
    );
    assert_eq!(completion.requests().len(), 1);
}

#[tokio::test]
async fn parse_requirements_missing_file_is_a_message() {
    let temp = TempDir::new().expect("tempdir");
    let session = session(temp.path());
    let err = TaskEngine::new(&session)
        .parse_requirements(Some("nope.md"), &CancellationToken::new())
        .await
        .expect_err("missing");
    assert!(err.user_message().contains("Could not read"));
}

#[tokio::test]
async fn decompose_links_subtasks_to_parent() {
    let temp = TempDir::new().expect("tempdir");
    let completion = ScriptedCompletion::new(vec![Ok(
        r#"[{"description": "Design the schema", "priority": "high"},
            {"description": "Write the migration", "priority": "medium"},
            {"description": "Backfill old rows", "priority": "low"}]"#
            .to_string(),
    )]);
    let session = session_with(temp.path(), completion);
    let engine = TaskEngine::new(&session);
    let mut parent = engine
        .create_task("Move users to the new database", Some(Priority::High))
        .expect("create");
    parent.add_tag("backend");
    let mut collection = session.store.load();
    collection.tasks[0] = parent.clone();
    session.store.save(&collection).expect("save");

    let outcome = engine
        .decompose(Some("task-001"), &CancellationToken::new())
        .await
        .expect("decompose");
    let Decomposition::Split { parent, subtasks } = outcome else {
        panic!("expected subtasks");
    };
    assert_eq!(parent.subtasks, vec!["TASK-002", "TASK-003", "TASK-004"]);
    for subtask in &subtasks {
        assert_eq!(subtask.parent_task_id.as_deref(), Some("TASK-001"));
        assert_eq!(subtask.tags, vec!["subtask".to_string(), "backend".to_string()]);
    }
    assert_eq!(session.store.load().tasks.len(), 4);
}

#[tokio::test]
async fn decompose_without_proposals_is_atomic() {
    let temp = TempDir::new().expect("tempdir");
    let completion = ScriptedCompletion::new(vec![Ok("[]".to_string())]);
    let session = session_with(temp.path(), completion);
    let engine = TaskEngine::new(&session);
    engine.create_task("Rename a variable", None).expect("create");

    let outcome = engine
        .decompose(Some("TASK-001"), &CancellationToken::new())
        .await
        .expect("decompose");
    assert!(matches!(outcome, Decomposition::Atomic(_)));
    assert_eq!(session.store.load().tasks.len(), 1);

    let err = engine
        .decompose(Some("TASK-404"), &CancellationToken::new())
        .await
        .expect_err("missing");
    assert!(matches!(err, OpError::NotFound(_)));
}

#[tokio::test]
async fn aborted_model_call_is_retryable_message() {
    let temp = TempDir::new().expect("tempdir");
    let completion = ScriptedCompletion::new(vec![Err(CompletionError::Aborted)]);
    let session = session_with(temp.path(), completion);
    let engine = TaskEngine::new(&session);
    engine.create_task("Split the monolith", None).expect("create");

    let err = engine
        .decompose(Some("TASK-001"), &CancellationToken::new())
        .await
        .expect_err("aborted");
    assert!(matches!(err, OpError::Aborted));
    assert!(err.user_message().contains("try again"));
}

#[tokio::test]
async fn enrich_uses_requirements_context_for_requirement_tasks() {
    let temp = TempDir::new().expect("tempdir");
    fs::write(
        temp.path().join("SECURITY.md"),
        "# Security\n\nAll traffic must be encrypted.\n- [ ] Rotate keys monthly\n",
    )
    .expect("doc");
    let completion = ScriptedCompletion::new(vec![Ok(
        "Rotate the signing keys every month and record the rotation.".to_string(),
    )]);
    let session = session_with(temp.path(), completion.clone());
    let engine = TaskEngine::new(&session);
    let cancel = CancellationToken::new();
    engine
        .parse_requirements(Some("SECURITY.md"), &cancel)
        .await
        .expect("parse");

    let task = engine.enrich(Some("TASK-001"), &cancel).await.expect("enrich");
    let enriched = task.enriched_content.expect("enriched");
    assert_eq!(enriched.kind, EnrichmentKind::Requirements);
    assert_eq!(
        enriched.description,
        "Rotate the signing keys every month and record the rotation."
    );
    assert!(enriched.context.starts_with("Section: Security"));

    let prompt = &completion.requests()[0][1].text;
    assert!(prompt.contains("Supporting context"));

    let mirror = fs::read_to_string(session.store.mirror_path("TASK-001")).expect("mirror");
    assert!(mirror.contains("## Enriched Context"));
}

#[tokio::test]
async fn enrich_without_service_keeps_original_description() {
    let temp = TempDir::new().expect("tempdir");
    let session = session(temp.path());
    let engine = TaskEngine::new(&session);
    engine.create_task("Cache the user list", None).expect("create");

    let task = engine
        .enrich(Some("TASK-001"), &CancellationToken::new())
        .await
        .expect("enrich");
    let enriched = task.enriched_content.expect("enriched");
    assert_eq!(enriched.kind, EnrichmentKind::Code);
    assert_eq!(enriched.description, "Cache the user list");
    assert_eq!(enriched.context, "");
}
