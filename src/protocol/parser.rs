//! Query parser for the line protocol

use super::command::Command;
use thiserror::Error;

/// Parse failures. The display text of each variant is exactly what a
/// client sees as the reply body for the offending line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("parser error: no tokens in query")]
    NoTokens,
    #[error("parser error: no enough arguments for set command")]
    NotEnoughArgsSet,
    #[error("parser error: no enough arguments for get command")]
    NotEnoughArgsGet,
    #[error("parser error: no enough arguments for del command")]
    NotEnoughArgsDel,
    #[error("parser error: unknown command type")]
    UnknownCommand,
    #[error("parser error: invalid argument")]
    InvalidArgument,
}

/// Parse one query line into a command.
///
/// Tokens are separated by runs of spaces and tabs. The first token
/// selects the command (case-sensitive); extra tokens beyond what the
/// command consumes are ignored. Consumed arguments must be non-empty
/// words of letters, digits and underscores.
pub fn parse(query: &str) -> Result<Command, ParseError> {
    let tokens: Vec<&str> = query
        .split(|c| c == ' ' || c == '\t')
        .filter(|t| !t.is_empty())
        .collect();

    let Some(&head) = tokens.first() else {
        return Err(ParseError::NoTokens);
    };

    match head {
        "SET" => {
            if tokens.len() < 3 {
                return Err(ParseError::NotEnoughArgsSet);
            }
            Ok(Command::Set {
                key: argument(tokens[1])?,
                value: argument(tokens[2])?,
            })
        }
        "GET" => {
            if tokens.len() < 2 {
                return Err(ParseError::NotEnoughArgsGet);
            }
            Ok(Command::Get {
                key: argument(tokens[1])?,
            })
        }
        "DEL" => {
            if tokens.len() < 2 {
                return Err(ParseError::NotEnoughArgsDel);
            }
            Ok(Command::Del {
                key: argument(tokens[1])?,
            })
        }
        _ => Err(ParseError::UnknownCommand),
    }
}

fn argument(token: &str) -> Result<String, ParseError> {
    if token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(token.to_string())
    } else {
        Err(ParseError::InvalidArgument)
    }
}
