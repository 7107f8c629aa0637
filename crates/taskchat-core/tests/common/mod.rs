#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use taskchat_core::completion::{
    ChatMessage, CompletionError, CompletionOptions, CompletionService, TextStream,
};
use taskchat_core::config::Settings;
use taskchat_core::Session;

/// Replays canned replies in order and records every request.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
        Arc::new(ScriptedCompletion {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn send_request(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
        _cancel: &CancellationToken,
    ) -> Result<TextStream, CompletionError> {
        self.requests.lock().expect("lock").push(messages.to_vec());
        let next = self
            .replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Unavailable("script exhausted".to_string())))?;
        // Split in two chunks so callers exercise stream joining.
        let middle = next.len() / 2;
        let middle = (middle..=next.len())
            .find(|idx| next.is_char_boundary(*idx))
            .unwrap_or(next.len());
        let (head, tail) = next.split_at(middle);
        let chunks = vec![Ok(head.to_string()), Ok(tail.to_string())];
        Ok(stream::iter(chunks).boxed())
    }
}

pub fn session(root: &Path) -> Session {
    Session::new(root, Settings::default())
}

pub fn session_with(root: &Path, completion: Arc<ScriptedCompletion>) -> Session {
    Session::new(root, Settings::default()).with_completion(completion)
}
