//! Tokens produced by the tokenizer and filled in by the later passes.
//!
//! A [`Token`] always keeps the source text it came from. Note and chord
//! tokens gain a [`NoteContext`] from the resolver and a [`ResolvedNote`]
//! from the finalizer; until then the corresponding accessors return `None`.

mod bar;
mod metadata;
mod note;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use bar::{classify_bar, BarObject, BarStyle, BarToken, BarType, RepeatDirection, RepeatForm};
pub(crate) use bar::{split_bar_lexeme, BAR_LEXEMES};
pub use metadata::{
    default_quarter_length_from_meter, parse_default_length, parse_key_signature,
    parse_metronome_mark, parse_time_signature, MetadataToken,
};
pub use note::{
    broken_rhythm_multipliers, duration_multiplier, parse_pitch_parts, quarter_length,
    resolve_pitch, scale_by_rhythm, BrokenRhythm, ParsedDuration, PitchParts, ResolvedPitch,
    Side,
};

use crate::error::{AbcError, Result};
use crate::music::{KeySignature, QuarterLength, SpannerRef, TupletRatio};
use crate::pitch_cache::PitchCache;

/// One lexical unit plus the text it was read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub src: String,
    pub kind: TokenKind,
}

impl Token {
    pub fn new(src: impl Into<String>, kind: TokenKind) -> Self {
        Token {
            src: src.into(),
            kind,
        }
    }

    pub fn is_note_or_chord(&self) -> bool {
        matches!(self.kind, TokenKind::Note(_) | TokenKind::Chord(_))
    }

    pub fn is_bar(&self) -> bool {
        matches!(self.kind, TokenKind::Bar(_))
    }

    pub fn as_metadata(&self) -> Option<&MetadataToken> {
        match &self.kind {
            TokenKind::Metadata(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bar(&self) -> Option<&BarToken> {
        match &self.kind {
            TokenKind::Bar(b) => Some(b),
            _ => None,
        }
    }

    /// The note part of a Note or Chord token.
    pub fn as_note(&self) -> Option<&NoteToken> {
        match &self.kind {
            TokenKind::Note(n) => Some(n),
            TokenKind::Chord(c) => Some(&c.note),
            _ => None,
        }
    }

    pub(crate) fn as_note_mut(&mut self) -> Option<&mut NoteToken> {
        match &mut self.kind {
            TokenKind::Note(n) => Some(n),
            TokenKind::Chord(c) => Some(&mut c.note),
            _ => None,
        }
    }

    pub fn as_chord(&self) -> Option<&ChordToken> {
        match &self.kind {
            TokenKind::Chord(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {:?}>", self.kind.name(), self.src)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Metadata(MetadataToken),
    Bar(BarToken),
    Tuplet(TupletToken),
    Note(NoteToken),
    Chord(ChordToken),
    /// `>`, `<<` and friends; the marker text is the token source
    BrokenRhythmMarker,
    Tie,
    SlurStart,
    /// Closes a slur, crescendo or diminuendo
    ParenStop,
    CrescendoStart,
    DiminuendoStart,
    Staccato,
    UpBow,
    DownBow,
    Accent,
    StrongAccent,
    Tenuto,
    GraceStart,
    GraceStop,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Metadata(_) => "Metadata",
            TokenKind::Bar(_) => "Bar",
            TokenKind::Tuplet(_) => "Tuplet",
            TokenKind::Note(_) => "Note",
            TokenKind::Chord(_) => "Chord",
            TokenKind::BrokenRhythmMarker => "BrokenRhythmMarker",
            TokenKind::Tie => "Tie",
            TokenKind::SlurStart => "SlurStart",
            TokenKind::ParenStop => "ParenStop",
            TokenKind::CrescendoStart => "CrescendoStart",
            TokenKind::DiminuendoStart => "DiminuendoStart",
            TokenKind::Staccato => "Staccato",
            TokenKind::UpBow => "UpBow",
            TokenKind::DownBow => "DownBow",
            TokenKind::Accent => "Accent",
            TokenKind::StrongAccent => "StrongAccent",
            TokenKind::Tenuto => "Tenuto",
            TokenKind::GraceStart => "GraceStart",
            TokenKind::GraceStop => "GraceStop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tie {
    Start,
    Stop,
    /// Tied from the previous note and into the next
    Continue,
}

impl Tie {
    /// Combine an existing tie state with a new one.
    pub fn merge(existing: Option<Tie>, new: Tie) -> Tie {
        match (existing, new) {
            (Some(Tie::Stop), Tie::Start) | (Some(Tie::Start), Tie::Stop) => Tie::Continue,
            (Some(Tie::Continue), _) => Tie::Continue,
            (_, new) => new,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Articulation {
    Staccato,
    UpBow,
    DownBow,
    Accent,
    StrongAccent,
    Tenuto,
}

/// `(n` tuplet marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupletToken {
    pub number_notes_actual: u8,
    pub number_notes_normal: Option<u8>,
    pub note_count_remaining: u8,
    /// `q` of the `(p:q:r` form
    pub explicit_normal: Option<u8>,
    /// `r` of the `(p:q:r` form
    pub explicit_count: Option<u8>,
    pub resolved: Option<TupletRatio>,
}

impl TupletToken {
    pub fn new(actual: u8, explicit_normal: Option<u8>, explicit_count: Option<u8>) -> Self {
        TupletToken {
            number_notes_actual: actual,
            number_notes_normal: None,
            note_count_remaining: explicit_count.unwrap_or(actual),
            explicit_normal,
            explicit_count,
            resolved: None,
        }
    }
}

/// Context the resolver attaches to a note or chord
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteContext {
    pub default_quarter_length: QuarterLength,
    pub key_signature: Option<KeySignature>,
    pub tuplet: Option<TupletRatio>,
    pub broken_rhythm: Option<BrokenRhythm>,
    pub tie: Option<Tie>,
    pub articulations: Vec<Articulation>,
    pub in_grace: bool,
    pub spanners: Vec<SpannerRef>,
}

impl NoteContext {
    pub fn new(default_quarter_length: QuarterLength, key_signature: Option<KeySignature>) -> Self {
        NoteContext {
            default_quarter_length,
            key_signature,
            tuplet: None,
            broken_rhythm: None,
            tie: None,
            articulations: Vec::new(),
            in_grace: false,
            spanners: Vec::new(),
        }
    }
}

/// What the finalizer computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedNote {
    pub pitch_name: Option<String>,
    pub is_rest: bool,
    pub accidental_display_status: Option<bool>,
    pub quarter_length: QuarterLength,
    /// The written duration could not be read and 1 was assumed
    pub malformed_duration: bool,
}

/// A note or rest lexeme such as `^g'3/2`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteToken {
    /// Quoted chord symbols written before the note, without quotes
    pub chord_symbols: Vec<String>,
    /// The lexeme with chord symbols removed
    pub body: String,
    pub context: Option<NoteContext>,
    pub resolved: Option<ResolvedNote>,
}

impl NoteToken {
    pub fn new(body: impl Into<String>, chord_symbols: Vec<String>) -> Self {
        NoteToken {
            chord_symbols,
            body: body.into(),
            context: None,
            resolved: None,
        }
    }

    pub fn with_context(mut self, context: NoteContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_resolution(mut self, resolved: ResolvedNote) -> Self {
        self.resolved = Some(resolved);
        self
    }

    /// Compute pitch and duration from the body and attached context.
    pub fn resolve(&self, cache: &PitchCache) -> Result<ResolvedNote> {
        let context = self.context.as_ref().ok_or_else(|| AbcError::MissingContext {
            src: self.body.clone(),
        })?;
        let pitch = cache.resolve(&self.body, context.key_signature.as_ref())?;
        let duration = quarter_length(
            &self.body,
            context.default_quarter_length,
            context.broken_rhythm.as_ref(),
            context.tuplet.as_ref(),
        );
        Ok(ResolvedNote {
            pitch_name: pitch.pitch_name,
            is_rest: pitch.is_rest,
            accidental_display_status: pitch.accidental_display_status,
            quarter_length: duration.quarter_length,
            malformed_duration: duration.malformed,
        })
    }

    pub fn pitch_name(&self) -> Option<&str> {
        self.resolved.as_ref()?.pitch_name.as_deref()
    }

    pub fn quarter_length(&self) -> Option<QuarterLength> {
        self.resolved.as_ref().map(|r| r.quarter_length)
    }

    pub fn is_rest(&self) -> bool {
        self.resolved.as_ref().is_some_and(|r| r.is_rest)
    }

    pub fn accidental_display_status(&self) -> Option<bool> {
        self.resolved.as_ref()?.accidental_display_status
    }

    pub fn tie(&self) -> Option<Tie> {
        self.context.as_ref()?.tie
    }

    pub fn articulations(&self) -> &[Articulation] {
        self.context
            .as_ref()
            .map(|c| c.articulations.as_slice())
            .unwrap_or(&[])
    }

    pub fn in_grace(&self) -> bool {
        self.context.as_ref().is_some_and(|c| c.in_grace)
    }

    pub fn broken_rhythm(&self) -> Option<&BrokenRhythm> {
        self.context.as_ref()?.broken_rhythm.as_ref()
    }

    pub fn applicable_spanners(&self) -> &[SpannerRef] {
        self.context
            .as_ref()
            .map(|c| c.spanners.as_slice())
            .unwrap_or(&[])
    }

    pub fn active_tuplet(&self) -> Option<TupletRatio> {
        self.context.as_ref()?.tuplet
    }
}

/// `[CEG]2`: the outer token plus its pitches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordToken {
    pub note: NoteToken,
    pub sub_tokens: Vec<NoteToken>,
}

impl ChordToken {
    pub fn new(body: impl Into<String>, chord_symbols: Vec<String>) -> Self {
        ChordToken {
            note: NoteToken::new(body, chord_symbols),
            sub_tokens: Vec::new(),
        }
    }

    /// Text between the brackets.
    pub fn inner(&self) -> &str {
        let body = self.note.body.as_str();
        let start = body.find('[').map(|i| i + 1).unwrap_or(0);
        let end = body.rfind(']').unwrap_or(body.len());
        body.get(start..end).unwrap_or("")
    }

    /// Duration characters after the closing bracket.
    pub fn duration_suffix(&self) -> &str {
        let body = self.note.body.as_str();
        match body.rfind(']') {
            Some(end) => &body[end + 1..],
            None => "",
        }
    }
}
