//! Entry point for chat text.
//!
//! An utterance is stripped of transport framing, expanded if it is a slash
//! command, classified and run. Anything the classifier does not recognise
//! goes to the completion service together with the recent history.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::completion::{complete_text, ChatMessage, CompletionError, CompletionOptions};
use crate::intent::classify_with_rule;
use crate::ops::TaskEngine;
use crate::priority::Priority;
use crate::session::Session;

/// Exchanges kept for the AI fallback.
pub const HISTORY_WINDOW: usize = 5;

pub const HELP_MESSAGE: &str = "I can help you manage tasks. Try one of these:\n\
- initialize task tracking [for this project]\n\
- create a [critical|high|medium|low] [priority] task to <description>\n\
- list tasks [with <priority> priority] [with status <status>]\n\
- what tasks are high priority\n\
- mark task <ID> as complete\n\
- mark task <ID> as <priority> priority\n\
- change <ID> priority to <priority>\n\
- scan for todos [in <pattern>]\n\
- parse <file> and create tasks\n\
- break <ID> into subtasks\n\
- enrich <ID>\n\
- prioritize tasks\n\
- what task should I work on next\n\
\n\
Slash commands: /init, /create, /list, /done, /priority, /scan, /parse, /next, /breakdown, /enrich, /prioritize, /help";

pub const ABORTED_MESSAGE: &str = "The model call was aborted. Please try again.";

const ASSISTANT_INSTRUCTION: &str = "You are a task management assistant inside a developer's \
workspace. Answer briefly. When the user seems to want a task operation, suggest the exact command \
phrase to use, such as \"create a high priority task to ...\", \"list tasks\", \"mark task TASK-001 \
as complete\", \"scan for todos\" or \"what task should I work on next\".";

static PARTICIPANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@[\w.-]+[:,]?\s*").expect("regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub reply: String,
}

pub struct Dispatcher {
    session: Session,
    history: VecDeque<Exchange>,
}

impl Dispatcher {
    pub fn new(session: Session) -> Self {
        Dispatcher {
            session,
            history: VecDeque::with_capacity(HISTORY_WINDOW),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn history(&self) -> impl Iterator<Item = &Exchange> {
        self.history.iter()
    }

    /// Produces a reply for one utterance. Never fails; problems become
    /// messages.
    pub async fn handle(&mut self, utterance: &str, cancel: &CancellationToken) -> String {
        let text = strip_framing(utterance);
        let reply = self.respond(text, cancel).await;
        self.remember(text, &reply);
        reply
    }

    async fn respond(&self, text: &str, cancel: &CancellationToken) -> String {
        if text.is_empty() {
            return HELP_MESSAGE.to_string();
        }
        let command = match expand_slash_command(text) {
            Some(SlashCommand::Help) => return HELP_MESSAGE.to_string(),
            Some(SlashCommand::Unknown(name)) => {
                return format!("Unknown command /{}.\n\n{}", name, HELP_MESSAGE)
            }
            Some(SlashCommand::Phrase(phrase)) => phrase,
            None if is_help_request(text) => return HELP_MESSAGE.to_string(),
            None => text.to_string(),
        };

        match classify_with_rule(&command) {
            Some((rule, intent)) => {
                tracing::debug!(rule, intent = intent.name(), "dispatching");
                TaskEngine::new(&self.session).execute(&intent, cancel).await
            }
            None => self.ask_assistant(&command, cancel).await,
        }
    }

    async fn ask_assistant(&self, text: &str, cancel: &CancellationToken) -> String {
        let messages = self.fallback_messages(text);
        let options = CompletionOptions::justified("unclassified chat message");
        match complete_text(self.session.completion.as_ref(), &messages, &options, cancel).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => HELP_MESSAGE.to_string(),
            Err(CompletionError::Aborted) => ABORTED_MESSAGE.to_string(),
            Err(err) => {
                tracing::debug!(error = %err, "assistant unavailable, showing help");
                HELP_MESSAGE.to_string()
            }
        }
    }

    /// Instruction, then the retained exchanges oldest first, then `text`.
    pub fn fallback_messages(&self, text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() * 2 + 2);
        messages.push(ChatMessage::assistant(ASSISTANT_INSTRUCTION));
        for exchange in &self.history {
            messages.push(ChatMessage::user(exchange.user.clone()));
            messages.push(ChatMessage::assistant(exchange.reply.clone()));
        }
        messages.push(ChatMessage::user(text));
        messages
    }

    fn remember(&mut self, user: &str, reply: &str) {
        if self.history.len() == HISTORY_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(Exchange {
            user: user.to_string(),
            reply: reply.to_string(),
        });
    }
}

/// Drops a leading `@participant` mention and surrounding whitespace.
pub fn strip_framing(utterance: &str) -> &str {
    let trimmed = utterance.trim();
    match PARTICIPANT.find(trimmed) {
        Some(found) => trimmed[found.end()..].trim(),
        None => trimmed,
    }
}

fn is_help_request(text: &str) -> bool {
    matches!(
        text.trim_end_matches(['?', '!', '.']).to_lowercase().as_str(),
        "help" | "commands" | "what can you do"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    /// Rewritten into the equivalent chat phrase.
    Phrase(String),
    Help,
    Unknown(String),
}

/// Expands `/name args` into the phrase the classifier understands. Returns
/// `None` for text that is not a slash command.
pub fn expand_slash_command(text: &str) -> Option<SlashCommand> {
    let rest = text.strip_prefix('/')?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let phrase = match name.to_lowercase().as_str() {
        "init" => "initialize task tracking".to_string(),
        "create" | "add" => create_phrase(args),
        "list" => format!("list tasks {}", args).trim_end().to_string(),
        "done" | "complete" => format!("mark task {} as complete", args),
        "priority" => priority_phrase(args),
        "scan" if args.is_empty() => "scan for todos".to_string(),
        "scan" => format!("scan for todos in {}", args),
        "parse" => format!("parse {} and create tasks", args),
        "next" => "what task should I work on next".to_string(),
        "breakdown" | "decompose" => format!("break {} into subtasks", args),
        "enrich" => format!("enrich {}", args),
        "prioritize" => "prioritize tasks".to_string(),
        "help" => return Some(SlashCommand::Help),
        other => return Some(SlashCommand::Unknown(other.to_string())),
    };
    Some(SlashCommand::Phrase(phrase))
}

/// `/create high fix login` carries the priority as its first word.
fn create_phrase(args: &str) -> String {
    if let Some((first, rest)) = args.split_once(char::is_whitespace) {
        if let Ok(priority) = first.parse::<Priority>() {
            return format!("create a {} priority task to {}", priority, rest.trim());
        }
    }
    format!("create a task to {}", args)
}

/// `/priority TASK-001 high`; the order of id and priority does not matter.
fn priority_phrase(args: &str) -> String {
    let mut priority = None;
    let mut rest = Vec::new();
    for word in args.split_whitespace() {
        match word.parse::<Priority>() {
            Ok(parsed) if priority.is_none() => priority = Some(parsed),
            _ => rest.push(word),
        }
    }
    match priority {
        Some(priority) => format!("mark task {} as {} priority", rest.join(" "), priority),
        None => format!("change task {} priority", rest.join(" ")),
    }
}
