use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::priority::Priority;

pub const DEFAULT_TASKS_DIR: &str = "tasks";
pub const DEFAULT_TODO_PATTERN: &str =
    "**/*.{rs,js,jsx,ts,tsx,mjs,cjs,py,go,java,kt,swift,c,h,cc,cpp,hpp,cs,rb,php,vue,svelte,html,css,scss,sh,yaml,yml,toml}";
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const COMPLETION_COMMAND_ENV: &str = "TASKCHAT_COMPLETION_COMMAND";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CompletionConfig {
    /// Command line of an external completion tool, e.g. `claude -p`.
    pub command: Option<String>,
    pub probe_timeout_secs: Option<u64>,
}

/// On-disk config; every field is optional so project and global files can
/// be layered.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TaskchatConfig {
    pub tasks_dir: Option<String>,
    pub default_priority: Option<Priority>,
    pub markdown_mirrors: Option<bool>,
    pub todo_pattern: Option<String>,
    /// Ask the completion service for action items in files without TODOs.
    pub todo_ai_fallback: Option<bool>,
    pub completion: Option<CompletionConfig>,
}

/// Effective settings after project, global and built-in defaults are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub tasks_dir: String,
    pub default_priority: Priority,
    pub markdown_mirrors: bool,
    pub todo_pattern: String,
    pub todo_ai_fallback: bool,
    pub completion_command: Option<String>,
    pub probe_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tasks_dir: DEFAULT_TASKS_DIR.to_string(),
            default_priority: Priority::Medium,
            markdown_mirrors: true,
            todo_pattern: DEFAULT_TODO_PATTERN.to_string(),
            todo_ai_fallback: true,
            completion_command: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

pub fn config_filename_candidates() -> [&'static str; 2] {
    [".taskchat.toml", ".taskchatrc"]
}

pub fn resolve_user_home_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    if let Ok(profile) = std::env::var("USERPROFILE") {
        let trimmed = profile.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    None
}

pub fn resolve_taskchat_home_dir() -> Option<PathBuf> {
    if let Ok(value) = std::env::var("TASKCHAT_HOME") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    resolve_user_home_dir().map(|home| home.join(".taskchat"))
}

pub fn global_config_path() -> Option<PathBuf> {
    resolve_taskchat_home_dir().map(|home| home.join("config.toml"))
}

pub fn load_config(repo_root: &Path) -> Option<TaskchatConfig> {
    for name in config_filename_candidates() {
        let path = repo_root.join(name);
        if path.is_file() {
            match fs::read_to_string(&path).map(|text| toml::from_str::<TaskchatConfig>(&text)) {
                Ok(Ok(config)) => return Some(config),
                Ok(Err(err)) => {
                    tracing::warn!(path = %path.display(), error = %err, "ignoring invalid config")
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable config")
                }
            }
        }
    }
    None
}

pub fn load_global_config() -> Option<TaskchatConfig> {
    let path = global_config_path()?;
    if !path.is_file() {
        return None;
    }
    let text = fs::read_to_string(path).ok()?;
    toml::from_str::<TaskchatConfig>(&text).ok()
}

/// Merges project config over global config over built-in defaults. The
/// completion command can also come from `TASKCHAT_COMPLETION_COMMAND`, which
/// wins over both files.
pub fn resolve_settings(repo_root: &Path) -> Settings {
    let project = load_config(repo_root).unwrap_or_default();
    let global = load_global_config().unwrap_or_default();
    let env_command = std::env::var(COMPLETION_COMMAND_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    merge_settings(&project, &global, env_command)
}

fn merge_settings(
    project: &TaskchatConfig,
    global: &TaskchatConfig,
    env_command: Option<String>,
) -> Settings {
    let defaults = Settings::default();
    let project_completion = project.completion.clone().unwrap_or_default();
    let global_completion = global.completion.clone().unwrap_or_default();

    Settings {
        tasks_dir: non_empty(project.tasks_dir.as_deref())
            .or_else(|| non_empty(global.tasks_dir.as_deref()))
            .unwrap_or(defaults.tasks_dir),
        default_priority: project
            .default_priority
            .or(global.default_priority)
            .unwrap_or(defaults.default_priority),
        markdown_mirrors: project
            .markdown_mirrors
            .or(global.markdown_mirrors)
            .unwrap_or(defaults.markdown_mirrors),
        todo_pattern: non_empty(project.todo_pattern.as_deref())
            .or_else(|| non_empty(global.todo_pattern.as_deref()))
            .unwrap_or(defaults.todo_pattern),
        todo_ai_fallback: project
            .todo_ai_fallback
            .or(global.todo_ai_fallback)
            .unwrap_or(defaults.todo_ai_fallback),
        completion_command: env_command
            .or_else(|| non_empty(project_completion.command.as_deref()))
            .or_else(|| non_empty(global_completion.command.as_deref())),
        probe_timeout_secs: project_completion
            .probe_timeout_secs
            .or(global_completion.probe_timeout_secs)
            .unwrap_or(defaults.probe_timeout_secs),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
