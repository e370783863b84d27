//! Query interpreter
//!
//! Thin wrapper over the parser. It keeps the transport layer away from
//! parser internals and leaves room for query validation or rewriting
//! before commands reach storage.

use super::command::Command;
use super::parser::{self, ParseError};

/// Interprets raw query lines into commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    /// Interpret one query line. Parse errors pass through unchanged;
    /// their display text is the reply the client receives.
    pub fn interpret(&self, query: &str) -> Result<Command, ParseError> {
        parser::parse(query)
    }
}
