//! Recoverable parser feedback.
//!
//! A bad measure should not cost the rest of a tune book, so most problems
//! are recorded here, logged through `tracing`, and parsing carries on with
//! a fallback.

use serde::{Deserialize, Serialize};

/// Line and column (1-based) in the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// One warning or note produced while parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub level: FeedbackLevel,
    pub message: String,
    pub location: Option<Location>,
    /// The source text the message is about
    pub src: Option<String>,
    pub suggestion: Option<String>,
}

impl Feedback {
    pub fn warning(message: impl Into<String>) -> Self {
        Feedback {
            level: FeedbackLevel::Warning,
            message: message.into(),
            location: None,
            src: None,
            suggestion: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Feedback {
            level: FeedbackLevel::Info,
            ..Feedback::warning(message)
        }
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackLevel {
    /// Parsed with a fallback, may not be what the author intended
    Warning,
    /// Minor oddity, nothing was changed
    Info,
}

/// Collector threaded through the passes
#[derive(Debug, Default)]
pub struct FeedbackCollector {
    feedback: Vec<Feedback>,
    location: Option<Location>,
}

impl FeedbackCollector {
    pub fn new() -> Self {
        FeedbackCollector::default()
    }

    /// Update position tracking (the tokenizer calls this as it advances)
    pub fn set_position(&mut self, line: usize, column: usize) {
        self.location = Some(Location { line, column });
    }

    /// Later passes work on tokens, not text positions.
    pub fn clear_position(&mut self) {
        self.location = None;
    }

    /// Record a warning about `src` at the current position.
    pub fn warning(&mut self, message: impl Into<String>, src: impl Into<String>) {
        let message = message.into();
        let src = src.into();
        tracing::warn!(src = %src, location = ?self.location, "{}", message);
        self.push(Feedback::warning(message).with_src(src));
    }

    pub fn warning_with_suggestion(
        &mut self,
        message: impl Into<String>,
        src: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        let message = message.into();
        let src = src.into();
        tracing::warn!(src = %src, location = ?self.location, "{}", message);
        self.push(
            Feedback::warning(message)
                .with_src(src)
                .with_suggestion(suggestion),
        );
    }

    pub fn info(&mut self, message: impl Into<String>, src: impl Into<String>) {
        let message = message.into();
        let src = src.into();
        tracing::debug!(src = %src, location = ?self.location, "{}", message);
        self.push(Feedback::info(message).with_src(src));
    }

    fn push(&mut self, feedback: Feedback) {
        let feedback = match self.location {
            Some(location) => feedback.at(location),
            None => feedback,
        };
        self.feedback.push(feedback);
    }

    /// Pull in feedback gathered by a nested pass.
    pub fn extend(&mut self, other: FeedbackCollector) {
        self.feedback.extend(other.feedback);
    }

    pub fn into_feedback(self) -> Vec<Feedback> {
        self.feedback
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }
}

/// A value plus whatever was recovered from on the way
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult<T> {
    pub value: T,
    pub feedback: Vec<Feedback>,
}

impl<T> ParseResult<T> {
    pub fn new(value: T, feedback: Vec<Feedback>) -> Self {
        ParseResult { value, feedback }
    }

    pub fn ok(value: T) -> Self {
        ParseResult {
            value,
            feedback: Vec::new(),
        }
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Feedback> {
        self.feedback
            .iter()
            .filter(|f| f.level == FeedbackLevel::Warning)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseResult<U> {
        ParseResult {
            value: f(self.value),
            feedback: self.feedback,
        }
    }
}
