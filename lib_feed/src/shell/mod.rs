//! # Command Shell
//!
//! Line-oriented front end for a [`FeedSession`]: `list`, `select <n>`,
//! `help`, `exit`. The interpreter only reads session snapshots and calls
//! `select`; the active dataset changes only when the server confirms.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::catalog::{Catalog, DatasetDescriptor};
use crate::core::state::SessionState;
use crate::error::{FeedError, FeedResult};
use crate::ingestors::FeedSession;

/// Line parsing.
pub mod command;

pub use command::Command;

pub const PROMPT: &str = "> ";

pub const HELP: &str = "\
Commands:
  list          show the available datasets
  select <n>    stream dataset number <n> from the list
  help          show this help
  exit          close the session and quit";

/// Result of executing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Silent,
    Exit,
}

/// Executes shell lines against a session.
pub struct CommandInterpreter {
    session: Arc<FeedSession>,
}

impl CommandInterpreter {
    pub fn new(session: Arc<FeedSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<FeedSession> {
        &self.session
    }

    pub async fn execute(&self, line: &str) -> Outcome {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => return Outcome::Output(format!("Error: {}", e)),
        };

        match command {
            Command::Empty => Outcome::Silent,
            Command::Help => Outcome::Output(HELP.to_string()),
            Command::Exit => Outcome::Exit,
            Command::List => Outcome::Output(render_listing(&self.session.snapshot().await)),
            Command::Select(index) => match self.select(index).await {
                Ok(message) => Outcome::Output(message),
                Err(e) => Outcome::Output(format!("Error: {}", e)),
            },
            Command::Unknown(text) => Outcome::Output(format!(
                "Unknown command '{}'. Type 'help' for the list of commands.",
                text
            )),
        }
    }

    /// Selects dataset `index` of the current catalog and waits for the
    /// server to confirm it.
    pub async fn select(&self, index: usize) -> FeedResult<String> {
        let descriptor = resolve(&self.session.snapshot().await.catalog, index)?;
        let confirmation = self.session.select(&descriptor).await?;
        Ok(match confirmation.dataset {
            Some(name) if name != descriptor.name => format!(
                "Selected [{}] {} (server reports '{}')",
                descriptor.index, descriptor.name, name
            ),
            _ => format!("Selected [{}] {}", descriptor.index, descriptor.name),
        })
    }

    /// Reads commands from `input` until `exit`, end of input, or the
    /// session stopping, then closes the session.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.read_eval_loop(input, &mut output).await;
        self.session.close().await;
        result
    }

    async fn read_eval_loop<R, W>(&self, input: R, output: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        while self.session.is_running() {
            output.write_all(PROMPT.as_bytes()).await?;
            output.flush().await?;

            let line = tokio::select! {
                biased;
                _ = self.session.closed() => None,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };

            match self.execute(&line).await {
                Outcome::Exit => break,
                Outcome::Silent => {}
                Outcome::Output(text) => {
                    output.write_all(text.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                }
            }
        }
        output.flush().await
    }
}

/// Maps a 1-based index onto the catalog, or explains why it can't.
pub fn resolve(catalog: &Catalog, index: usize) -> FeedResult<DatasetDescriptor> {
    if catalog.is_empty() {
        return Err(FeedError::Validation("No datasets are available yet".to_string()));
    }
    catalog.get(index).ok_or_else(|| {
        FeedError::Validation(format!("Index {} is out of range (1-{})", index, catalog.len()))
    })
}

/// Renders the catalog grouped by category with 1-based numbers, marking
/// the active dataset.
pub fn render_listing(state: &SessionState) -> String {
    if state.catalog.is_empty() {
        return "No datasets available yet.".to_string();
    }

    let active = state.active_dataset.as_deref();
    let mut out = String::from("Available datasets:");
    let mut current_category: Option<&str> = None;
    let flattened = state.catalog.flatten();

    for descriptor in &flattened {
        if current_category != Some(descriptor.category.as_str()) {
            out.push_str(&format!("\n{}:", descriptor.category));
            current_category = Some(descriptor.category.as_str());
        }
        let marker = match active {
            Some(name) if name == descriptor.name || name == descriptor.path => "  (active)",
            _ => "",
        };
        out.push_str(&format!("\n  [{}] {}{}", descriptor.index, descriptor.name, marker));
    }

    match active {
        Some(name) => out.push_str(&format!("\nActive dataset: {}", name)),
        None => out.push_str("\nNo dataset selected."),
    }
    out
}
