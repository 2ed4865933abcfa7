//! The three passes and the parser that runs them.
//!
//! Tokenizing never fails; it drops what it can't read and says so in the
//! feedback. Resolving and finalizing can fail for the whole tune, see
//! [`AbcError`](crate::error::AbcError).

pub mod finalizer;
pub mod resolver;
pub mod tokenizer;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ParseOptions;
use crate::error::Result;
use crate::feedback::{FeedbackCollector, ParseResult};
use crate::pitch_cache::PitchCache;
use crate::reference::extract_reference_number;
use crate::segment::split_by_reference_number;
use crate::token::Token;

pub use finalizer::finalize;
pub use resolver::{resolve, ResolverState, SpanTag};
pub use tokenizer::tokenize;

/// Each tune of a book, keyed by its `X:` number.
pub type TuneBook = BTreeMap<Option<u32>, Result<ParseResult<Vec<Token>>>>;

/// Runs tokenizer, resolver and finalizer with one set of options.
///
/// Cloning is cheap and clones share the pitch cache.
#[derive(Debug, Clone, Default)]
pub struct AbcParser {
    options: ParseOptions,
    cache: Arc<PitchCache>,
}

impl AbcParser {
    pub fn new(options: ParseOptions) -> Self {
        AbcParser {
            options,
            cache: Arc::new(PitchCache::new()),
        }
    }

    /// Use an existing cache, e.g. one shared by worker threads.
    pub fn with_cache(options: ParseOptions, cache: Arc<PitchCache>) -> Self {
        AbcParser { options, cache }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<PitchCache> {
        &self.cache
    }

    pub fn tokenize(&self, src: &str) -> ParseResult<Vec<Token>> {
        let mut collector = FeedbackCollector::new();
        let tokens = tokenize(src, &self.options, &mut collector);
        ParseResult::new(tokens, collector.into_feedback())
    }

    /// Tokenize, resolve and finalize one tune.
    pub fn parse(&self, src: &str) -> Result<ParseResult<Vec<Token>>> {
        let mut collector = FeedbackCollector::new();
        let tokens = tokenize(src, &self.options, &mut collector);
        let tokens = self.process(tokens, &mut collector)?;
        Ok(ParseResult::new(tokens, collector.into_feedback()))
    }

    /// Parse only the tune numbered `number` out of a book.
    pub fn parse_reference(&self, src: &str, number: &str) -> Result<ParseResult<Vec<Token>>> {
        let tune = extract_reference_number(src, number)?;
        self.parse(&tune)
    }

    /// Parse every tune of a book independently. A tune that fails does
    /// not stop the others; tokenizer feedback for the whole book is
    /// returned alongside.
    pub fn parse_book(&self, src: &str) -> ParseResult<TuneBook> {
        let mut collector = FeedbackCollector::new();
        let tokens = tokenize(src, &self.options, &mut collector);

        let book = split_by_reference_number(tokens)
            .into_iter()
            .map(|(number, tune)| {
                let mut tune_collector = FeedbackCollector::new();
                let parsed = self
                    .process(tune, &mut tune_collector)
                    .map(|tokens| ParseResult::new(tokens, tune_collector.into_feedback()));
                if let Err(error) = &parsed {
                    tracing::warn!(reference = ?number, %error, "Skipping tune");
                }
                (number, parsed)
            })
            .collect();
        ParseResult::new(book, collector.into_feedback())
    }

    fn process(&self, tokens: Vec<Token>, collector: &mut FeedbackCollector) -> Result<Vec<Token>> {
        let tokens = resolve(tokens, &self.options, collector)?;
        finalize(tokens, &self.cache, &self.options, collector)
    }
}
