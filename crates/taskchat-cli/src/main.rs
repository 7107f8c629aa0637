use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{prelude::*, EnvFilter};

use taskchat_core::completion::{CommandCompletion, CompletionService, UnavailableCompletion};
use taskchat_core::config::{resolve_settings, Settings};
use taskchat_core::{Dispatcher, Session};

mod version;

const LOG_ENV: &str = "TASKCHAT_LOG";

#[derive(Parser)]
#[command(name = "taskchat", version = version::FULL, about = "Chat-driven task manager")]
struct Cli {
    /// Workspace root holding the tasks directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Handle a single chat message, e.g. `taskchat ask list tasks`
    Ask {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Read chat messages from stdin, one per line
    Chat,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Ask { words }) => {
            let mut dispatcher = dispatcher(&cli.root).await?;
            let reply = handle(&mut dispatcher, &words.join(" ")).await;
            println!("{}", reply);
        }
        Some(Command::Chat) => {
            let mut dispatcher = dispatcher(&cli.root).await?;
            chat(&mut dispatcher).await?;
        }
        Some(Command::Version) => {
            println!("taskchat {}", version::FULL);
        }
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

async fn dispatcher(root: &Path) -> Result<Dispatcher> {
    let root = root
        .canonicalize()
        .with_context(|| format!("workspace root {} not found", root.display()))?;
    let settings = resolve_settings(&root);
    let completion = completion_service(&settings).await;
    let session = Session::new(&root, settings).with_completion(completion);
    Ok(Dispatcher::new(session))
}

async fn completion_service(settings: &Settings) -> Arc<dyn CompletionService> {
    let Some(command_line) = settings.completion_command.as_deref() else {
        return Arc::new(UnavailableCompletion::new("no completion command configured"));
    };
    let command = match CommandCompletion::from_command_line(command_line) {
        Ok(command) => command,
        Err(err) => {
            tracing::warn!(command = command_line, error = %err, "completion command unusable");
            return Arc::new(UnavailableCompletion::new(err.to_string()));
        }
    };
    let timeout = Duration::from_secs(settings.probe_timeout_secs);
    if command.probe(timeout).await {
        tracing::debug!(program = %command.program().display(), "completion command ready");
        Arc::new(command)
    } else {
        Arc::new(UnavailableCompletion::new(format!(
            "{} did not respond",
            command_line
        )))
    }
}

/// Ctrl-C while a message is being handled aborts the model call instead of
/// the process.
async fn handle(dispatcher: &mut Dispatcher, text: &str) -> String {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let reply = dispatcher.handle(text, &cancel).await;
    watcher.abort();
    reply
}

async fn chat(dispatcher: &mut Dispatcher) -> Result<()> {
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }
        let reply = handle(dispatcher, line).await;
        println!("{}\n", reply);
    }
    Ok(())
}
