use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::task::TaskCollection;

pub const COLLECTION_FILENAME: &str = "tasks.json";

static TASK_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)TASK-([0-9]+)").expect("regex"));

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize task collection: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Initialization failures, split by stage so the caller can say exactly what
/// went wrong.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Could not resolve the workspace path {path}: {source}")]
    ResolvePaths {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not create the tasks directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize task collection: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Created { path: PathBuf },
    AlreadyInitialized { path: PathBuf, task_count: usize },
}

/// Location of one workspace's task collection and its markdown mirrors.
#[derive(Debug, Clone)]
pub struct TaskStore {
    workspace_root: PathBuf,
    tasks_dir: PathBuf,
}

impl TaskStore {
    pub fn new(workspace_root: &Path, tasks_dir: &str) -> Self {
        TaskStore {
            workspace_root: workspace_root.to_path_buf(),
            tasks_dir: workspace_root.join(tasks_dir.trim()),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }

    pub fn collection_path(&self) -> PathBuf {
        self.tasks_dir.join(COLLECTION_FILENAME)
    }

    pub fn mirror_path(&self, task_id: &str) -> PathBuf {
        self.tasks_dir.join(format!("{}.md", task_id))
    }

    pub fn is_initialized(&self) -> bool {
        self.collection_path().is_file()
    }

    pub fn load(&self) -> TaskCollection {
        read_collection(&self.collection_path())
    }

    pub fn save(&self, collection: &TaskCollection) -> Result<(), StoreError> {
        write_collection(&self.collection_path(), collection)
    }

    pub fn initialize(&self) -> Result<InitOutcome, InitError> {
        self.workspace_root
            .canonicalize()
            .map_err(|source| InitError::ResolvePaths {
                path: self.workspace_root.clone(),
                source,
            })?;

        let path = self.collection_path();
        if path.is_file() {
            let task_count = self.load().tasks.len();
            return Ok(InitOutcome::AlreadyInitialized { path, task_count });
        }

        fs::create_dir_all(&self.tasks_dir).map_err(|source| InitError::CreateDir {
            path: self.tasks_dir.clone(),
            source,
        })?;
        let raw = serde_json::to_string_pretty(&TaskCollection::empty())?;
        fs::write(&path, raw).map_err(|source| InitError::WriteFile {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "initialized task collection");
        Ok(InitOutcome::Created { path })
    }
}

/// Reads a collection, recovering to an empty one when the file is missing or
/// unreadable. Callers rely on this never failing.
pub fn read_collection(path: &Path) -> TaskCollection {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return TaskCollection::empty(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read task collection");
            return TaskCollection::empty();
        }
    };
    match serde_json::from_str::<TaskCollection>(&raw) {
        Ok(collection) => collection,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to parse task collection");
            TaskCollection::empty()
        }
    }
}

pub fn write_collection(path: &Path, collection: &TaskCollection) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let raw = serde_json::to_string_pretty(collection)?;
    fs::write(path, raw).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Digits of a `TASK-<n>` suffix with leading zeros stripped ("0" when all zeros).
fn suffix_digits(id: &str) -> Option<&str> {
    let digits = TASK_NUMBER.captures(id)?.get(1)?.as_str();
    let trimmed = digits.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed })
}

/// Numeric suffix of a `TASK-<n>` id, or 0 when there is none.
/// Suffixes wider than `u64` saturate at `u64::MAX`.
pub fn extract_task_number(id: &str) -> u64 {
    suffix_digits(id)
        .map(|digits| digits.parse::<u64>().unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Smallest id strictly greater than every existing suffix. Suffixes are
/// compared as decimal strings so ids of any width stay ordered.
pub fn next_id(collection: &TaskCollection) -> String {
    let max = collection
        .tasks
        .iter()
        .filter_map(|task| suffix_digits(&task.id))
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .unwrap_or("0");
    format!("TASK-{:0>3}", increment_decimal(max))
}

fn increment_decimal(digits: &str) -> String {
    let mut out: Vec<u8> = digits.bytes().collect();
    for digit in out.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return out.iter().map(|d| char::from(*d)).collect();
        }
    }
    out.insert(0, b'1');
    out.iter().map(|d| char::from(*d)).collect()
}
