//! ABC notation tokenizer, context resolver and segmenter.
//!
//! Text goes through three passes: the tokenizer splits it into tokens,
//! the resolver attaches meter, key, default length, ties, tuplets and
//! spanners to every note, and the finalizer computes pitch names and
//! durations. The [`segment`] functions then split the result into tunes,
//! voices and measures.
//!
//! # Example
//!
//! ```
//! use abc_format::parse;
//!
//! let abc = r#"
//! X:1
//! T:Test Tune
//! M:6/8
//! L:1/8
//! K:G
//! c1D2|
//! "#;
//!
//! let result = parse(abc).unwrap();
//! let notes: Vec<_> = result.value.iter().filter_map(|t| t.as_note()).collect();
//! assert_eq!(notes[0].pitch_name(), Some("C5"));
//! assert_eq!(notes[1].pitch_name(), Some("D4"));
//! ```

pub mod config;
pub mod error;
pub mod feedback;
pub mod music;
pub mod parser;
pub mod pitch_cache;
pub mod reference;
pub mod segment;
pub mod token;

pub use config::{ConfigError, ParseOptions};
pub use error::{AbcError, Result, TokenContext};
pub use feedback::{Feedback, FeedbackCollector, FeedbackLevel, Location, ParseResult};
pub use music::QuarterLength;
pub use parser::{AbcParser, TuneBook};
pub use pitch_cache::PitchCache;
pub use reference::extract_reference_number;
pub use segment::BarDelimitedSequence;
pub use token::{
    Articulation, BarToken, ChordToken, MetadataToken, NoteToken, Tie, Token, TokenKind,
    TupletToken,
};

/// Parse one tune with default options and a private pitch cache.
pub fn parse(input: &str) -> Result<ParseResult<Vec<Token>>> {
    AbcParser::default().parse(input)
}

/// Tokenize with default options, without resolving anything.
pub fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    AbcParser::default().tokenize(input)
}
