//! Parser for operator console lines.
//!
//! The first word selects a [`CommandSpec`](super::catalog::CommandSpec);
//! the remainder is handed to a `winnow` argument parser for that command and
//! must be consumed entirely. Keywords are matched case-insensitively.

use core::fmt;

use winnow::ascii::{dec_uint, space0, space1};
use winnow::ModalResult;
use winnow::combinator::{opt, preceded};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take_while;

use super::catalog::{self, CommandTag};

/// Structured commands produced by [`parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Confirm,
    Reset,
    Status,
    Results,
    Log { count: Option<usize> },
    Save,
    Help { topic: Option<String> },
    Exit,
}

/// Errors reported for a console line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The line held only whitespace.
    Empty,
    UnknownCommand(String),
    /// Arguments did not fit the command's usage; `offset` is a byte offset
    /// into the trimmed line.
    InvalidArguments {
        command: &'static str,
        usage: &'static str,
        offset: usize,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::UnknownCommand(keyword) => {
                write!(f, "unknown command '{keyword}'; type 'help' for a list")
            }
            ParseError::InvalidArguments {
                command,
                usage,
                offset,
            } => write!(
                f,
                "invalid arguments for '{command}' at column {}; usage: {usage}",
                offset + 1
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses one console line.
///
/// # Errors
///
/// Returns a [`ParseError`] for blank lines, unknown keywords, or arguments
/// that do not match the command's usage.
pub fn parse(line: &str) -> Result<ConsoleCommand, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut rest = line;
    let word = keyword
        .parse_next(&mut rest)
        .map_err(|_| ParseError::UnknownCommand(line.to_string()))?;
    let spec = catalog::find(word).ok_or_else(|| ParseError::UnknownCommand(word.to_string()))?;

    let consumed = line.len() - rest.len();
    arguments(spec.tag)
        .parse(rest)
        .map_err(|err| ParseError::InvalidArguments {
            command: spec.name,
            usage: spec.usage,
            offset: consumed + err.offset(),
        })
}

fn keyword<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '?'
    })
    .parse_next(input)
}

fn count(input: &mut &str) -> ModalResult<usize> {
    preceded(space1, dec_uint).parse_next(input)
}

fn topic(input: &mut &str) -> ModalResult<String> {
    preceded(space1, keyword)
        .map(str::to_ascii_lowercase)
        .parse_next(input)
}

fn arguments<'s>(tag: CommandTag) -> impl Parser<&'s str, ConsoleCommand, ErrMode<ContextError>> {
    move |input: &mut &'s str| -> ModalResult<ConsoleCommand> {
        let command = match tag {
            CommandTag::Start => ConsoleCommand::Start,
            CommandTag::Confirm => ConsoleCommand::Confirm,
            CommandTag::Reset => ConsoleCommand::Reset,
            CommandTag::Status => ConsoleCommand::Status,
            CommandTag::Results => ConsoleCommand::Results,
            CommandTag::Log => ConsoleCommand::Log {
                count: opt(count).parse_next(input)?,
            },
            CommandTag::Save => ConsoleCommand::Save,
            CommandTag::Help => ConsoleCommand::Help {
                topic: opt(topic).parse_next(input)?,
            },
            CommandTag::Exit => ConsoleCommand::Exit,
        };
        trailing_space(input)?;
        Ok(command)
    }
}

fn trailing_space<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    space0.parse_next(input)
}
