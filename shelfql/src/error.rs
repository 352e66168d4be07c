//! Errors raised while reading query text

use std::fmt;

/// Query text could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// What was being parsed (`filter`, `pipeline`, ...)
    pub context: Option<&'static str>,
    /// Byte offset into the input, when known
    pub position: Option<usize>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            position: None,
        }
    }

    pub fn in_context(mut self, context: &'static str) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_position(mut self, pos: usize) -> Self {
        self.position = Some(pos);
        self
    }

    /// Build an error from a nom failure, locating it within `input`
    pub(crate) fn from_nom(input: &str, err: nom::Err<nom::error::Error<&str>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => ParseError::new("incomplete input"),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                let near: String = e.input.chars().take(20).collect();
                let pos = input.len().saturating_sub(e.input.len());
                if near.is_empty() {
                    ParseError::new("unexpected end of input").with_position(pos)
                } else {
                    ParseError::new(format!("unexpected input near '{}'", near)).with_position(pos)
                }
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.context {
            Some(ctx) => write!(f, "invalid {}: {}", ctx, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(pos) = self.position {
            write!(f, " at position {}", pos)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
