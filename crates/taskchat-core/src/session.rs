use std::path::Path;
use std::sync::Arc;

use crate::completion::{CompletionService, UnavailableCompletion};
use crate::config::Settings;
use crate::context::{ContextProvider, WorkspaceContextProvider};
use crate::extract::todo::{ProgressReporter, TracingProgress};
use crate::store::TaskStore;

/// Everything one chat session needs, built once and passed to every
/// operation.
#[derive(Clone)]
pub struct Session {
    pub settings: Settings,
    pub store: TaskStore,
    pub completion: Arc<dyn CompletionService>,
    pub context: Arc<dyn ContextProvider>,
    pub progress: Arc<dyn ProgressReporter>,
}

impl Session {
    /// A session with no completion service, workspace-file context lookups
    /// and progress sent to the log.
    pub fn new(workspace_root: &Path, settings: Settings) -> Self {
        let store = TaskStore::new(workspace_root, &settings.tasks_dir);
        Session {
            store,
            completion: Arc::new(UnavailableCompletion::default()),
            context: Arc::new(WorkspaceContextProvider::new(workspace_root)),
            progress: Arc::new(TracingProgress),
            settings,
        }
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_context_provider(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        self.store.workspace_root()
    }
}
