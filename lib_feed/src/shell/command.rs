//! Parsing of single shell lines into [`Command`]s.

use crate::error::{FeedError, FeedResult};

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Help,
    Exit,
    /// 1-based index into the flattened catalog.
    Select(usize),
    Empty,
    /// Anything unrecognized, trimmed.
    Unknown(String),
}

impl Command {
    /// Parses a line. Keywords are case-insensitive.
    ///
    /// # Errors
    /// [`FeedError::Validation`] when `select` is missing its argument or the
    /// argument is not a positive integer.
    pub fn parse(line: &str) -> FeedResult<Command> {
        let trimmed = line.trim();
        let mut words = trimmed.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(Command::Empty);
        };

        let command = match head.to_lowercase().as_str() {
            "list" | "ls" => Command::List,
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            "select" => {
                let argument = words
                    .next()
                    .ok_or_else(|| FeedError::Validation("Usage: select <number>".to_string()))?;
                if words.next().is_some() {
                    return Err(FeedError::Validation("Usage: select <number>".to_string()));
                }
                Command::Select(parse_index(argument)?)
            }
            _ => Command::Unknown(trimmed.to_string()),
        };
        Ok(command)
    }
}

fn parse_index(argument: &str) -> FeedResult<usize> {
    let index: usize = argument.parse().map_err(|_| {
        FeedError::Validation(format!("'{}' is not a valid dataset number", argument))
    })?;
    if index == 0 {
        return Err(FeedError::Validation("Dataset numbers start at 1".to_string()));
    }
    Ok(index)
}
