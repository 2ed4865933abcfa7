//! Fatal parse errors.
//!
//! Anything here aborts the current tune. Problems that can be worked
//! around are reported through [`crate::feedback`] instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::Token;

/// Sources of the tokens around the one that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenContext {
    pub previous: Option<String>,
    pub current: String,
    pub next: Option<String>,
}

impl TokenContext {
    pub fn new(current: impl Into<String>) -> Self {
        TokenContext {
            previous: None,
            current: current.into(),
            next: None,
        }
    }

    pub fn between(previous: Option<&Token>, current: &Token, next: Option<&Token>) -> Self {
        TokenContext {
            previous: previous.map(|t| t.src.clone()),
            current: current.src.clone(),
            next: next.map(|t| t.src.clone()),
        }
    }
}

impl fmt::Display for TokenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} >>{}<< {}",
            self.previous.as_deref().unwrap_or(""),
            self.current,
            self.next.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AbcError {
    #[error("no pitch letter in note '{src}' (at {context})")]
    MissingPitch { src: String, context: TokenContext },

    #[error("token '{src}' resolved before its context was attached")]
    MissingContext { src: String },

    #[error("note reached before any L: or M: field (at {context})")]
    MissingDefaultLength { context: TokenContext },

    #[error("unsupported tuplet '({digit}' (at {context})")]
    UnsupportedTuplet { digit: u8, context: TokenContext },

    #[error("tie without a preceding note or chord (at {context})")]
    TieWithoutNote { context: TokenContext },

    #[error("reference number X:{number} not found")]
    ReferenceNumberNotFound { number: String },
}

impl AbcError {
    /// Attach token neighbourhood to errors raised without one.
    pub(crate) fn with_context(self, context: TokenContext) -> Self {
        match self {
            AbcError::MissingPitch { src, .. } => AbcError::MissingPitch { src, context },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, AbcError>;
