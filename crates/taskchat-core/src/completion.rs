//! Boundary to the language-model completion service.
//!
//! The core treats the model as a black box that turns an ordered message
//! list into streamed text. Callers decide how to degrade when it fails.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Why the request is made; surfaced in logs.
    pub justification: Option<String>,
}

impl CompletionOptions {
    pub fn justified(reason: &str) -> Self {
        CompletionOptions {
            justification: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Completion service unavailable: {0}")]
    Unavailable(String),
    #[error("Model call aborted")]
    Aborted,
}

impl CompletionError {
    /// An aborted call can simply be issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CompletionError::Aborted)
    }
}

pub type TextStream = BoxStream<'static, Result<String, CompletionError>>;

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn send_request(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<TextStream, CompletionError>;
}

/// Drains a stream into one string, honouring cancellation between chunks.
pub async fn collect_text(
    mut stream: TextStream,
    cancel: &CancellationToken,
) -> Result<String, CompletionError> {
    let mut text = String::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(CompletionError::Aborted),
            next = stream.next() => match next {
                Some(chunk) => text.push_str(&chunk?),
                None => break,
            },
        }
    }
    Ok(text)
}

pub async fn complete_text(
    service: &dyn CompletionService,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    cancel: &CancellationToken,
) -> Result<String, CompletionError> {
    let stream = service.send_request(messages, options, cancel).await?;
    collect_text(stream, cancel).await
}

/// Stand-in used when no completion service is configured or reachable.
#[derive(Debug, Clone, Default)]
pub struct UnavailableCompletion {
    reason: String,
}

impl UnavailableCompletion {
    pub fn new(reason: impl Into<String>) -> Self {
        UnavailableCompletion {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CompletionService for UnavailableCompletion {
    async fn send_request(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
        _cancel: &CancellationToken,
    ) -> Result<TextStream, CompletionError> {
        let reason = if self.reason.is_empty() {
            "no completion service configured".to_string()
        } else {
            self.reason.clone()
        };
        Err(CompletionError::Unavailable(reason))
    }
}

/// Runs an external command (for example `claude -p`), writes the transcript
/// to its stdin and streams stdout back line by line.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandCompletion {
    pub fn from_command_line(command_line: &str) -> Result<Self, CompletionError> {
        let mut words = shell_words::split(command_line)
            .map_err(|err| CompletionError::Unavailable(format!("invalid command: {}", err)))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| CompletionError::Unavailable("empty command".to_string()))?;
        let program = which::which(&program).map_err(|err| {
            CompletionError::Unavailable(format!("{} not found: {}", program, err))
        })?;
        Ok(CommandCompletion {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Checks the command starts and exits within `timeout`.
    pub async fn probe(&self, timeout: Duration) -> bool {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(timeout, cmd.status()).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                tracing::warn!(program = %self.program.display(), error = %err, "completion command failed to start");
                false
            }
            Err(_) => {
                tracing::warn!(program = %self.program.display(), ?timeout, "completion command probe timed out");
                false
            }
        }
    }
}

pub fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut transcript = String::new();
    for message in messages {
        transcript.push_str(message.role.as_str());
        transcript.push_str(": ");
        transcript.push_str(message.text.trim());
        transcript.push_str("\n\n");
    }
    transcript.push_str("Assistant:");
    transcript
}

#[async_trait]
impl CompletionService for CommandCompletion {
    async fn send_request(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<TextStream, CompletionError> {
        if cancel.is_cancelled() {
            return Err(CompletionError::Aborted);
        }
        tracing::debug!(
            program = %self.program.display(),
            messages = messages.len(),
            justification = options.justification.as_deref().unwrap_or(""),
            "sending completion request"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| CompletionError::Unavailable(format!("failed to start: {}", err)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(render_transcript(messages).as_bytes())
                .await
                .map_err(|err| CompletionError::Unavailable(format!("failed to send prompt: {}", err)))?;
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompletionError::Unavailable("no stdout".to_string()))?;

        let (tx, rx) = mpsc::channel::<Result<String, CompletionError>>(32);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        child.kill().await.ok();
                        let _ = tx.send(Err(CompletionError::Aborted)).await;
                        return;
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if tx.send(Ok(format!("{}\n", line))).await.is_err() {
                                child.kill().await.ok();
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            let _ = tx
                                .send(Err(CompletionError::Unavailable(format!("read failed: {}", err))))
                                .await;
                            return;
                        }
                    },
                }
            }
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let _ = tx
                        .send(Err(CompletionError::Unavailable(format!("exited with {}", status))))
                        .await;
                }
                Err(err) => {
                    let _ = tx
                        .send(Err(CompletionError::Unavailable(format!("wait failed: {}", err))))
                        .await;
                }
            }
        });

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_ends_with_assistant_turn() {
        let transcript = render_transcript(&[
            ChatMessage::assistant("You manage tasks."),
            ChatMessage::user("hello"),
        ]);
        assert_eq!(transcript, "Assistant: You manage tasks.\n\nUser: hello\n\nAssistant:");
    }

    #[tokio::test]
    async fn unavailable_service_reports_reason() {
        let service = UnavailableCompletion::new("offline");
        let err = complete_text(
            &service,
            &[ChatMessage::user("hi")],
            &CompletionOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("unavailable");
        assert_eq!(err, CompletionError::Unavailable("offline".to_string()));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn collect_text_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pending: TextStream = stream::pending().boxed();
        let err = collect_text(pending, &cancel).await.expect_err("aborted");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn collect_text_joins_chunks() {
        let chunks: TextStream =
            stream::iter(vec![Ok("a".to_string()), Ok("b".to_string())]).boxed();
        let text = collect_text(chunks, &CancellationToken::new()).await.expect("text");
        assert_eq!(text, "ab");
    }

    #[test]
    fn command_line_must_resolve() {
        let err = CommandCompletion::from_command_line("definitely-not-a-real-binary-xyz -p")
            .expect_err("missing binary");
        assert!(matches!(err, CompletionError::Unavailable(_)));
        assert!(CommandCompletion::from_command_line("   ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_completion_streams_stdout() {
        let service = CommandCompletion::from_command_line("cat").expect("cat on PATH");
        let text = complete_text(
            &service,
            &[ChatMessage::user("ping")],
            &CompletionOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .expect("completion");
        assert!(text.contains("User: ping"));
    }
}
