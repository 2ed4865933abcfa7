//! Last pass: every note and chord computes its pitch and duration from the
//! context the resolver attached.

use std::iter::Peekable;

use crate::config::ParseOptions;
use crate::error::{AbcError, Result, TokenContext};
use crate::feedback::FeedbackCollector;
use crate::music::QuarterLength;
use crate::pitch_cache::PitchCache;
use crate::token::{
    quarter_length, scale_by_rhythm, ChordToken, NoteContext, NoteToken, ResolvedNote, Token,
    TokenKind,
};

use super::tokenizer::tokenize;

/// Resolve pitch and duration of every note and chord.
///
/// Tokens that already carry a resolution are passed through untouched, so
/// finalizing twice changes nothing.
pub fn finalize(
    tokens: Vec<Token>,
    cache: &PitchCache,
    options: &ParseOptions,
    collector: &mut FeedbackCollector,
) -> Result<Vec<Token>> {
    Finalizer {
        cache,
        options,
        collector,
        output: Vec::with_capacity(tokens.len()),
    }
    .run(tokens.into_iter().peekable())
}

struct Finalizer<'a> {
    cache: &'a PitchCache,
    options: &'a ParseOptions,
    collector: &'a mut FeedbackCollector,
    output: Vec<Token>,
}

impl Finalizer<'_> {
    fn run<I: Iterator<Item = Token>>(mut self, mut input: Peekable<I>) -> Result<Vec<Token>> {
        while let Some(token) = input.next() {
            let context = TokenContext::between(self.output.last(), &token, input.peek());
            let token = self
                .step(token)
                .map_err(|e| e.with_context(context))?;
            self.output.push(token);
        }
        Ok(self.output)
    }

    fn step(&mut self, token: Token) -> Result<Token> {
        let Token { src, kind } = token;
        let kind = match kind {
            TokenKind::Note(note) if note.resolved.is_none() => {
                TokenKind::Note(self.finalize_note(note, &src)?)
            }
            TokenKind::Chord(chord) if chord.note.resolved.is_none() => {
                TokenKind::Chord(self.finalize_chord(chord, &src)?)
            }
            other => other,
        };
        Ok(Token { src, kind })
    }

    fn finalize_note(&mut self, note: NoteToken, src: &str) -> Result<NoteToken> {
        let resolved = note.resolve(self.cache)?;
        if resolved.malformed_duration {
            self.collector.warning_with_suggestion(
                "Unreadable duration, using the default length",
                src,
                "Write durations as N, /N or N/D",
            );
        }
        Ok(note.with_resolution(resolved))
    }

    /// Chords take their duration from the bracketed notes, each read
    /// against the chord's own suffix as its default length.
    fn finalize_chord(&mut self, chord: ChordToken, src: &str) -> Result<ChordToken> {
        let context = chord
            .note
            .context
            .clone()
            .ok_or_else(|| AbcError::MissingContext {
                src: chord.note.body.clone(),
            })?;

        let base = quarter_length(
            chord.duration_suffix(),
            context.default_quarter_length,
            None,
            None,
        );
        if base.malformed {
            self.collector
                .warning("Unreadable chord duration, using the default length", src);
        }

        let sub_tokens = self.chord_members(chord.inner(), &context, base.quarter_length)?;

        // The last member's duration wins over the chord's own suffix.
        let written = sub_tokens
            .last()
            .and_then(NoteToken::quarter_length)
            .unwrap_or(base.quarter_length);
        let scaled = scale_by_rhythm(
            written,
            context.broken_rhythm.as_ref(),
            context.tuplet.as_ref(),
        );
        if scaled.is_none() {
            self.collector
                .warning("Chord duration out of range, ignoring its rhythm", src);
        }

        let resolved = ResolvedNote {
            pitch_name: None,
            is_rest: sub_tokens.is_empty(),
            accidental_display_status: None,
            quarter_length: scaled.unwrap_or(written),
            malformed_duration: base.malformed || scaled.is_none(),
        };
        Ok(ChordToken {
            note: chord.note.with_resolution(resolved),
            sub_tokens,
        })
    }

    /// Tokenize and resolve the inside of a chord. No metadata, spanners or
    /// markers apply here; only the chord's key and base length carry in.
    fn chord_members(
        &mut self,
        inner: &str,
        context: &NoteContext,
        base_length: QuarterLength,
    ) -> Result<Vec<NoteToken>> {
        let mut nested = FeedbackCollector::new();
        let tokens = tokenize(inner, self.options, &mut nested);
        self.collector.extend(nested);

        let mut members = Vec::new();
        for token in tokens {
            let TokenKind::Note(note) = token.kind else {
                continue;
            };
            let note =
                note.with_context(NoteContext::new(base_length, context.key_signature));
            let resolved = note.resolve(self.cache)?;
            if resolved.is_rest {
                continue;
            }
            members.push(note.with_resolution(resolved));
        }
        Ok(members)
    }
}
