//! TODO comment extraction and the workspace scan that feeds it.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use globwalk::{FileType, GlobWalkerBuilder};
use regex::Regex;
use thiserror::Error;

use super::{ExtractError, Extractor, TaskCandidate};
use crate::priority::Priority;

/// A progress message is emitted after this many files.
pub const PROGRESS_INTERVAL: usize = 20;

/// Upper bound on files handed to the fallback extractor in one scan.
pub const FALLBACK_MAX_FILES: usize = 10;

const BUILTIN_EXCLUDES: [&str; 6] = ["node_modules", ".git", "target", "dist", "out", "build"];

static TODO_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?://+|/\*+|#+|<!--|\{/\*)\s*TODO\b(?:\s*\(([^)]*)\))?\s*:?\s*(.*?)\s*(?:\*/\s*\}?|-->)?\s*$",
    )
    .expect("regex")
});

pub trait ProgressReporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Default reporter: progress goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Finds `TODO` comments line by line.
#[derive(Debug, Clone, Copy)]
pub struct TodoCommentExtractor {
    default_priority: Priority,
}

impl TodoCommentExtractor {
    pub fn new(default_priority: Priority) -> Self {
        TodoCommentExtractor { default_priority }
    }

    pub fn scan_text(&self, text: &str) -> Vec<TaskCandidate> {
        text.lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let caps = TODO_COMMENT.captures(line)?;
                let description = caps.get(2)?.as_str().trim();
                if description.is_empty() {
                    return None;
                }
                let priority = caps
                    .get(1)
                    .and_then(|hint| Priority::from_hint(hint.as_str()))
                    .unwrap_or(self.default_priority);
                Some(TaskCandidate::new(description, priority, Some(idx + 1)))
            })
            .collect()
    }
}

#[async_trait]
impl Extractor for TodoCommentExtractor {
    fn name(&self) -> &'static str {
        "todo-comments"
    }

    async fn extract(&self, text: &str) -> Result<Vec<TaskCandidate>, ExtractError> {
        Ok(self.scan_text(text))
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globwalk::GlobError,
    },
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// One candidate found in one file. `file` is workspace-relative with `/`
/// separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoMatch {
    pub file: String,
    pub candidate: TaskCandidate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub matches: Vec<TodoMatch>,
}

pub struct TodoScanner<'a> {
    root: &'a Path,
    pattern: String,
    excludes: Vec<String>,
    extractor: &'a dyn Extractor,
    fallback: Option<&'a dyn Extractor>,
    progress: &'a dyn ProgressReporter,
}

impl<'a> TodoScanner<'a> {
    pub fn new(
        root: &'a Path,
        pattern: &str,
        extractor: &'a dyn Extractor,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        TodoScanner {
            root,
            pattern: pattern.trim().to_string(),
            excludes: Vec::new(),
            extractor,
            fallback: None,
            progress,
        }
    }

    /// Extractor consulted only when the whole scan finds nothing, over at
    /// most [`FALLBACK_MAX_FILES`] files.
    pub fn with_fallback(mut self, fallback: &'a dyn Extractor) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    /// Matching files in path order.
    pub fn candidate_files(&self) -> Result<Vec<PathBuf>, ScanError> {
        let mut patterns = vec![self.pattern.clone()];
        patterns.extend(self.excludes.iter().map(|exclude| format!("!{}", exclude)));
        let walker = GlobWalkerBuilder::from_patterns(self.root, &patterns)
            .file_type(FileType::FILE)
            .build()
            .map_err(|source| ScanError::Pattern {
                pattern: self.pattern.clone(),
                source,
            })?;
        let mut files: Vec<PathBuf> = walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.into_path()),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable path");
                    None
                }
            })
            .collect();
        files.sort();
        Ok(files)
    }

    pub async fn scan(&self) -> Result<ScanReport, ScanError> {
        let files = self.candidate_files()?;
        let total = files.len();
        tracing::info!(pattern = %self.pattern, files = total, "scanning for TODOs");

        let mut report = ScanReport::default();
        for (idx, path) in files.iter().enumerate() {
            match fs::read_to_string(path) {
                Ok(text) => {
                    let file = self.relative(path);
                    for candidate in self.extractor.extract(&text).await? {
                        report.matches.push(TodoMatch {
                            file: file.clone(),
                            candidate,
                        });
                    }
                }
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "skipping unreadable file");
                }
            }
            report.files_scanned += 1;
            if (idx + 1) % PROGRESS_INTERVAL == 0 {
                self.progress
                    .report(&format!("Scanned {} of {} files", idx + 1, total));
            }
        }

        if report.matches.is_empty() {
            if let Some(fallback) = self.fallback {
                report.matches = self.fallback_pass(fallback, &files).await?;
            }
        }
        Ok(report)
    }

    async fn fallback_pass(
        &self,
        fallback: &dyn Extractor,
        files: &[PathBuf],
    ) -> Result<Vec<TodoMatch>, ScanError> {
        if files.len() > FALLBACK_MAX_FILES {
            tracing::info!(
                files = files.len(),
                limit = FALLBACK_MAX_FILES,
                "fallback extraction limited to the first files"
            );
        }
        let mut matches = Vec::new();
        for path in files.iter().take(FALLBACK_MAX_FILES) {
            let Ok(text) = fs::read_to_string(path) else {
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            let file = self.relative(path);
            tracing::debug!(file = %file, extractor = fallback.name(), "no TODOs found, trying fallback");
            for candidate in fallback.extract(&text).await? {
                matches.push(TodoMatch {
                    file: file.clone(),
                    candidate,
                });
            }
        }
        Ok(matches)
    }

    fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(self.root).unwrap_or(path);
        relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Exclude globs for a scan: built-in build and dependency directories, the
/// tasks directory and whatever `.gitignore` lists.
pub fn exclude_patterns(root: &Path, tasks_dir: &str) -> Vec<String> {
    let mut excludes = BTreeSet::new();
    for name in BUILTIN_EXCLUDES {
        excludes.insert(format!("**/{}/**", name));
    }
    let tasks_dir = tasks_dir.trim().trim_matches('/');
    if !tasks_dir.is_empty() {
        excludes.insert(format!("{}/**", tasks_dir));
    }
    excludes.extend(gitignore_excludes(root));
    excludes.into_iter().collect()
}

/// Translates `.gitignore` into exclude globs. Negated (`!`) lines are
/// dropped, so re-included paths stay excluded.
pub fn gitignore_excludes(root: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(root.join(".gitignore")) else {
        return Vec::new();
    };
    let mut excludes = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let dir_only = line.ends_with('/');
        let name = line.trim_matches('/');
        if name.is_empty() {
            continue;
        }
        // A leading or inner slash anchors the pattern to the root.
        let anchored = line.starts_with('/') || name.contains('/');
        let base = if anchored {
            name.to_string()
        } else {
            format!("**/{}", name)
        };
        if !dir_only {
            excludes.push(base.clone());
        }
        excludes.push(format!("{}/**", base));
    }
    excludes
}
