//! Context resolution: one forward pass that carries meter, key, default
//! length, open spanners and pending markers, and attaches a
//! [`NoteContext`] to every note and chord.

use std::iter::Peekable;

use crate::config::ParseOptions;
use crate::error::{AbcError, Result, TokenContext};
use crate::feedback::FeedbackCollector;
use crate::music::{
    KeySignature, QuarterLength, SpannerKind, SpannerRef, TimeSignature, TupletRatio,
};
use crate::token::{
    broken_rhythm_multipliers, Articulation, BrokenRhythm, ChordToken, MetadataToken,
    NoteContext, Side, Tie, Token, TokenKind, TupletToken,
};

/// Entry on the open-bracket stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanTag {
    Tuplet,
    Spanner(SpannerRef),
}

/// Everything the resolver carries from one token to the next.
#[derive(Debug, Clone)]
pub struct ResolverState {
    pub default_quarter_length: Option<QuarterLength>,
    pub key_signature: Option<KeySignature>,
    pub time_signature: Option<TimeSignature>,
    /// Output index of the tuplet still collecting notes
    pub active_tuplet: Option<usize>,
    pub active_parens: Vec<SpanTag>,
    pub active_spanners: Vec<SpannerRef>,
    pub pending_articulations: Vec<Articulation>,
    pub pending_tie: bool,
    pub pending_broken_rhythm: Option<String>,
    pub in_grace: bool,
    next_spanner_id: usize,
    assumed_meter: TimeSignature,
    fallback_default_length: Option<QuarterLength>,
}

impl ResolverState {
    pub fn new(options: &ParseOptions) -> Self {
        ResolverState {
            default_quarter_length: None,
            key_signature: None,
            time_signature: None,
            active_tuplet: None,
            active_parens: Vec::new(),
            active_spanners: Vec::new(),
            pending_articulations: Vec::new(),
            pending_tie: false,
            pending_broken_rhythm: None,
            in_grace: false,
            next_spanner_id: 0,
            assumed_meter: options.assumed_time_signature(),
            fallback_default_length: options.fallback_quarter_length(),
        }
    }

    fn apply_metadata(&mut self, meta: &MetadataToken) {
        if meta.is_reference_number() {
            self.active_parens.clear();
            self.active_spanners.clear();
            self.pending_articulations.clear();
            self.pending_tie = false;
            self.pending_broken_rhythm = None;
            self.active_tuplet = None;
            self.in_grace = false;
        }
        if meta.is_meter() {
            self.time_signature = meta.time_signature();
        }
        // M: and L: both restate the default length; the latest one wins
        if let Some(length) = meta.default_quarter_length() {
            self.default_quarter_length = Some(length);
        }
        if meta.is_key() {
            self.key_signature = meta.key_signature();
        }
    }

    fn open_spanner(&mut self, kind: SpannerKind) {
        let spanner = SpannerRef {
            id: self.next_spanner_id,
            kind,
        };
        self.next_spanner_id += 1;
        self.active_spanners.push(spanner);
        self.active_parens.push(SpanTag::Spanner(spanner));
    }

    /// Close the innermost slur or hairpin. Tuplet tags stay until the
    /// tuplet runs out of notes.
    fn close_paren(&mut self) {
        let Some(pos) = self
            .active_parens
            .iter()
            .rposition(|tag| matches!(tag, SpanTag::Spanner(_)))
        else {
            return;
        };
        if let SpanTag::Spanner(spanner) = self.active_parens.remove(pos) {
            if let Some(pos) = self.active_spanners.iter().rposition(|s| *s == spanner) {
                self.active_spanners.remove(pos);
            }
        }
    }

    fn mark(&mut self, articulation: Articulation) {
        if !self.pending_articulations.contains(&articulation) {
            self.pending_articulations.push(articulation);
        }
    }

    /// Ratio for a `(p` marker under the current meter.
    pub fn tuplet_ratio(&self, tuplet: &TupletToken) -> Option<TupletRatio> {
        let meter = self.time_signature.unwrap_or(self.assumed_meter);
        let compound = meter.beat_division_count() == 3;
        let normal = match tuplet.number_notes_actual {
            1 => 1,
            2 => 3,
            3 => 2,
            4 => 3,
            5 | 7 if compound => 3,
            5 | 7 => 2,
            6 => 2,
            8 => 3,
            9 => 2,
            _ => return None,
        };
        let normal = tuplet.explicit_normal.unwrap_or(normal);
        Some(TupletRatio::new(
            u32::from(tuplet.number_notes_actual),
            u32::from(normal),
        ))
    }

    /// Build the context for the next note, consuming pending markers.
    fn note_context(&mut self, default_quarter_length: QuarterLength) -> NoteContext {
        let mut context = NoteContext::new(default_quarter_length, self.key_signature);
        context.spanners = self.active_spanners.clone();
        context.articulations = std::mem::take(&mut self.pending_articulations);
        context.in_grace = self.in_grace;
        if std::mem::take(&mut self.pending_tie) {
            context.tie = Some(Tie::Stop);
        }
        if let Some(marker) = self.pending_broken_rhythm.take() {
            context.broken_rhythm = Some(BrokenRhythm::new(marker, Side::Right));
        }
        context
    }
}

/// Attach context to every note and chord in `tokens`.
pub fn resolve(
    tokens: Vec<Token>,
    options: &ParseOptions,
    collector: &mut FeedbackCollector,
) -> Result<Vec<Token>> {
    Resolver {
        state: ResolverState::new(options),
        output: Vec::with_capacity(tokens.len()),
        collector,
    }
    .run(tokens.into_iter().peekable())
}

struct Resolver<'a> {
    state: ResolverState,
    output: Vec<Token>,
    collector: &'a mut FeedbackCollector,
}

impl Resolver<'_> {
    fn run<I: Iterator<Item = Token>>(mut self, mut input: Peekable<I>) -> Result<Vec<Token>> {
        while let Some(token) = input.next() {
            let token = self.step(token, input.peek())?;
            self.output.push(token);
        }
        Ok(self.output)
    }

    fn context(&self, current: &Token, next: Option<&Token>) -> TokenContext {
        TokenContext::between(self.output.last(), current, next)
    }

    fn step(&mut self, token: Token, next: Option<&Token>) -> Result<Token> {
        if token.is_note_or_chord() {
            return self.note(token, next);
        }
        if matches!(token.kind, TokenKind::Tuplet(_)) {
            return self.tuplet(token, next);
        }
        match &token.kind {
            TokenKind::Metadata(meta) => {
                if meta.is_default_note_length() && meta.default_quarter_length().is_none() {
                    self.collector.warning_with_suggestion(
                        "Unreadable default note length, keeping the previous one",
                        &token.src,
                        "Write L:1/8",
                    );
                }
                self.state.apply_metadata(meta)
            }
            TokenKind::BrokenRhythmMarker => self.broken_rhythm(&token, next),
            TokenKind::SlurStart => self.state.open_spanner(SpannerKind::Slur),
            TokenKind::CrescendoStart => self.state.open_spanner(SpannerKind::Crescendo),
            TokenKind::DiminuendoStart => self.state.open_spanner(SpannerKind::Diminuendo),
            TokenKind::ParenStop => self.state.close_paren(),
            TokenKind::Tie => self.tie(&token, next)?,
            TokenKind::Staccato => self.state.mark(Articulation::Staccato),
            TokenKind::UpBow => self.state.mark(Articulation::UpBow),
            TokenKind::DownBow => self.state.mark(Articulation::DownBow),
            TokenKind::Accent => self.state.mark(Articulation::Accent),
            TokenKind::StrongAccent => self.state.mark(Articulation::StrongAccent),
            TokenKind::Tenuto => self.state.mark(Articulation::Tenuto),
            TokenKind::GraceStart => self.state.in_grace = true,
            TokenKind::GraceStop => self.state.in_grace = false,
            TokenKind::Bar(_) | TokenKind::Tuplet(_) | TokenKind::Note(_) | TokenKind::Chord(_) => {}
        }
        Ok(token)
    }

    fn broken_rhythm(&mut self, marker: &Token, next: Option<&Token>) {
        let flanked = self.output.last().is_some_and(Token::is_note_or_chord)
            && next.is_some_and(Token::is_note_or_chord);
        if !flanked {
            self.collector
                .warning("Broken rhythm marker not between two notes", &marker.src);
            return;
        }
        if broken_rhythm_multipliers(&marker.src).is_none() {
            self.collector.warning_with_suggestion(
                "Unknown broken rhythm marker",
                &marker.src,
                "Use >, >>, >>>, <, << or <<<",
            );
            return;
        }
        if let Some(context) = self
            .output
            .last_mut()
            .and_then(Token::as_note_mut)
            .and_then(|n| n.context.as_mut())
        {
            context.broken_rhythm = Some(BrokenRhythm::new(marker.src.clone(), Side::Left));
        }
        self.state.pending_broken_rhythm = Some(marker.src.clone());
    }

    fn tuplet(&mut self, token: Token, next: Option<&Token>) -> Result<Token> {
        let ratio = match &token.kind {
            TokenKind::Tuplet(tuplet) => match self.state.tuplet_ratio(tuplet) {
                Some(ratio) => ratio,
                None => {
                    return Err(AbcError::UnsupportedTuplet {
                        digit: tuplet.number_notes_actual,
                        context: self.context(&token, next),
                    })
                }
            },
            _ => return Ok(token),
        };
        let Token { src, kind } = token;
        let TokenKind::Tuplet(tuplet) = kind else {
            return Ok(Token { src, kind });
        };

        if self.state.active_tuplet.take().is_some() {
            self.drop_tuplet_tag();
        }
        self.state.active_parens.push(SpanTag::Tuplet);
        self.state.active_tuplet = Some(self.output.len());

        let tuplet = TupletToken {
            number_notes_normal: u8::try_from(ratio.normal).ok(),
            resolved: Some(ratio),
            ..tuplet
        };
        Ok(Token::new(src, TokenKind::Tuplet(tuplet)))
    }

    /// Tuplets never see a closing token; their tag leaves the stack when
    /// they run out of notes.
    fn drop_tuplet_tag(&mut self) {
        if let Some(pos) = self
            .state
            .active_parens
            .iter()
            .rposition(|tag| *tag == SpanTag::Tuplet)
        {
            self.state.active_parens.remove(pos);
        }
    }

    fn tie(&mut self, token: &Token, next: Option<&Token>) -> Result<()> {
        let context = self.context(token, next);
        let previous = self
            .output
            .last_mut()
            .and_then(Token::as_note_mut)
            .and_then(|n| n.context.as_mut())
            .ok_or(AbcError::TieWithoutNote { context })?;
        previous.tie = Some(Tie::merge(previous.tie, Tie::Start));
        self.state.pending_tie = true;
        Ok(())
    }

    fn note(&mut self, token: Token, next: Option<&Token>) -> Result<Token> {
        let default_quarter_length = match self
            .state
            .default_quarter_length
            .or(self.state.fallback_default_length)
        {
            Some(length) => length,
            None => {
                return Err(AbcError::MissingDefaultLength {
                    context: self.context(&token, next),
                })
            }
        };

        let mut context = self.state.note_context(default_quarter_length);
        context.tuplet = self.take_tuplet_slot();
        Ok(attach_context(token, context))
    }

    /// Ratio of the active tuplet, counting this note against it.
    fn take_tuplet_slot(&mut self) -> Option<TupletRatio> {
        let index = self.state.active_tuplet?;
        let Some(TokenKind::Tuplet(tuplet)) = self.output.get_mut(index).map(|t| &mut t.kind)
        else {
            self.state.active_tuplet = None;
            return None;
        };
        if tuplet.note_count_remaining == 0 {
            self.state.active_tuplet = None;
            self.drop_tuplet_tag();
            return None;
        }
        tuplet.note_count_remaining -= 1;
        let ratio = tuplet.resolved;
        if tuplet.note_count_remaining == 0 {
            self.state.active_tuplet = None;
            self.drop_tuplet_tag();
        }
        ratio
    }
}

fn attach_context(token: Token, context: NoteContext) -> Token {
    let Token { src, kind } = token;
    let kind = match kind {
        TokenKind::Note(note) => TokenKind::Note(note.with_context(context)),
        TokenKind::Chord(chord) => TokenKind::Chord(ChordToken {
            note: chord.note.with_context(context),
            ..chord
        }),
        other => other,
    };
    Token { src, kind }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenizer::tokenize;
    use num_rational::Ratio;
    use pretty_assertions::assert_eq;

    fn run(src: &str) -> Result<Vec<Token>> {
        let options = ParseOptions::default();
        let mut collector = FeedbackCollector::new();
        let tokens = tokenize(src, &options, &mut collector);
        resolve(tokens, &options, &mut collector)
    }

    fn notes(tokens: &[Token]) -> Vec<&crate::token::NoteToken> {
        tokens.iter().filter_map(Token::as_note).collect()
    }

    fn context(tokens: &[Token], index: usize) -> &NoteContext {
        notes(tokens)[index].context.as_ref().unwrap()
    }

    fn tuplet_of(token: &Token) -> &TupletToken {
        match &token.kind {
            TokenKind::Tuplet(t) => t,
            other => panic!("expected tuplet, got {other:?}"),
        }
    }

    #[test]
    fn test_default_length_from_meter_and_l() {
        let tokens = run("M:2/4\nA\nM:6/8\nB\nL:1/16\nc\nM:3/4\nd").unwrap();
        assert_eq!(context(&tokens, 0).default_quarter_length, Ratio::new(1, 4));
        assert_eq!(context(&tokens, 1).default_quarter_length, Ratio::new(1, 2));
        assert_eq!(context(&tokens, 2).default_quarter_length, Ratio::new(1, 4));
        // a later meter restates the default length
        assert_eq!(context(&tokens, 3).default_quarter_length, Ratio::new(1, 2));
    }

    #[test]
    fn test_meter_after_l_recomputes_default_length() {
        let tokens = run("L:1/16\nM:4/4\nA\nL:1/4\nB").unwrap();
        assert_eq!(context(&tokens, 0).default_quarter_length, Ratio::new(1, 2));
        assert_eq!(context(&tokens, 1).default_quarter_length, Ratio::from_integer(1));
    }

    #[test]
    fn test_unreadable_default_length_keeps_previous() {
        let options = ParseOptions::default();
        let mut collector = FeedbackCollector::new();
        let tokens = tokenize("L:1/8\nA\nL:4294967295/8\nB", &options, &mut collector);
        let tokens = resolve(tokens, &options, &mut collector).unwrap();
        assert_eq!(context(&tokens, 1).default_quarter_length, Ratio::new(1, 2));
        assert_eq!(collector.feedback().len(), 1);
    }

    #[test]
    fn test_missing_default_length() {
        let err = run("K:G\nABC").unwrap_err();
        match err {
            AbcError::MissingDefaultLength { context } => {
                assert_eq!(context.current, "A");
                assert_eq!(context.previous.as_deref(), Some("K:G"));
                assert_eq!(context.next.as_deref(), Some("B"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fallback_default_length() {
        let options = ParseOptions {
            fallback_default_length: Some("1/8".to_string()),
            ..ParseOptions::default()
        };
        let mut collector = FeedbackCollector::new();
        let tokens = tokenize("K:D\nA", &options, &mut collector);
        let tokens = resolve(tokens, &options, &mut collector).unwrap();
        assert_eq!(context(&tokens, 0).default_quarter_length, Ratio::new(1, 2));
    }

    #[test]
    fn test_key_signature_attached() {
        let tokens = run("L:1/8\nK:D\nf").unwrap();
        assert_eq!(
            context(&tokens, 0).key_signature,
            Some(KeySignature::new(2, None))
        );
    }

    #[test]
    fn test_tuplet_ratios() {
        let tokens = run("L:1/8\n(3abc").unwrap();
        assert_eq!(tuplet_of(&tokens[1]).resolved, Some(TupletRatio::new(3, 2)));

        let tokens = run("M:6/8\n(5abcde").unwrap();
        assert_eq!(tuplet_of(&tokens[1]).resolved, Some(TupletRatio::new(5, 3)));

        let tokens = run("L:1/8\n(5abcde").unwrap();
        assert_eq!(tuplet_of(&tokens[1]).resolved, Some(TupletRatio::new(5, 2)));
        assert_eq!(tuplet_of(&tokens[1]).number_notes_normal, Some(2));
    }

    #[test]
    fn test_tuplet_counts_notes() {
        let tokens = run("L:1/8\n(3abc d").unwrap();
        let tuplet = tuplet_of(&tokens[1]);
        assert_eq!(tuplet.note_count_remaining, 0);
        for i in 0..3 {
            assert_eq!(context(&tokens, i).tuplet, Some(TupletRatio::new(3, 2)));
        }
        assert_eq!(context(&tokens, 3).tuplet, None);
    }

    #[test]
    fn test_long_form_tuplet() {
        let tokens = run("L:1/8\n(3:2:2ab c").unwrap();
        assert_eq!(context(&tokens, 1).tuplet, Some(TupletRatio::new(3, 2)));
        assert_eq!(context(&tokens, 2).tuplet, None);
    }

    #[test]
    fn test_unsupported_tuplet() {
        let err = run("L:1/8\n(0abc").unwrap_err();
        assert!(matches!(err, AbcError::UnsupportedTuplet { digit: 0, .. }));
    }

    #[test]
    fn test_slur_inside_tuplet_closes() {
        let tokens = run("L:1/8\n((3abc) d").unwrap();
        let slur = context(&tokens, 0).spanners.clone();
        assert_eq!(slur.len(), 1);
        assert_eq!(slur[0].kind, SpannerKind::Slur);
        assert_eq!(context(&tokens, 2).spanners, slur);
        assert!(context(&tokens, 3).spanners.is_empty());
    }

    #[test]
    fn test_slur_closed_while_tuplet_active() {
        let tokens = run("L:1/8\n(A(3Bc)d e f").unwrap();
        let slur = context(&tokens, 0).spanners.clone();
        assert_eq!(slur.len(), 1);
        assert_eq!(context(&tokens, 2).spanners, slur);
        for i in 3..6 {
            assert!(context(&tokens, i).spanners.is_empty(), "note {i}");
        }
        // the paren did not cut the tuplet short
        assert_eq!(context(&tokens, 3).tuplet, Some(TupletRatio::new(3, 2)));
        assert_eq!(context(&tokens, 4).tuplet, None);
    }

    #[test]
    fn test_stray_paren_stop_is_ignored() {
        let tokens = run("L:1/8\n(3A)Bc d").unwrap();
        assert_eq!(context(&tokens, 2).tuplet, Some(TupletRatio::new(3, 2)));
        assert!(context(&tokens, 3).spanners.is_empty());
        assert_eq!(context(&tokens, 3).tuplet, None);
    }

    #[test]
    fn test_nested_spanners() {
        let tokens = run("L:1/8\n!crescendo(!A (B c) d!crescendo)! e").unwrap();
        assert_eq!(context(&tokens, 0).spanners.len(), 1);
        assert_eq!(context(&tokens, 1).spanners.len(), 2);
        assert_eq!(context(&tokens, 2).spanners.len(), 2);
        assert_eq!(context(&tokens, 3).spanners.len(), 1);
        assert_eq!(
            context(&tokens, 3).spanners[0].kind,
            SpannerKind::Crescendo
        );
        assert!(context(&tokens, 4).spanners.is_empty());
    }

    #[test]
    fn test_reference_number_clears_spanners() {
        let tokens = run("X:1\nL:1/8\n(AB\nX:2\nL:1/8\nc").unwrap();
        assert!(context(&tokens, 2).spanners.is_empty());
    }

    #[test]
    fn test_ties() {
        let tokens = run("L:1/8\nA-A-A B").unwrap();
        assert_eq!(context(&tokens, 0).tie, Some(Tie::Start));
        assert_eq!(context(&tokens, 1).tie, Some(Tie::Continue));
        assert_eq!(context(&tokens, 2).tie, Some(Tie::Stop));
        assert_eq!(context(&tokens, 3).tie, None);
    }

    #[test]
    fn test_tie_across_bar() {
        let tokens = run("L:1/8\nc2-|c2").unwrap();
        assert_eq!(context(&tokens, 0).tie, Some(Tie::Start));
        assert_eq!(context(&tokens, 1).tie, Some(Tie::Stop));
    }

    #[test]
    fn test_tie_without_note() {
        let err = run("L:1/8\n|-A").unwrap_err();
        assert!(matches!(err, AbcError::TieWithoutNote { .. }));
    }

    #[test]
    fn test_broken_rhythm() {
        let tokens = run("L:1/8\nA>B").unwrap();
        assert_eq!(
            context(&tokens, 0).broken_rhythm,
            Some(BrokenRhythm::new(">", Side::Left))
        );
        assert_eq!(
            context(&tokens, 1).broken_rhythm,
            Some(BrokenRhythm::new(">", Side::Right))
        );
    }

    #[test]
    fn test_misplaced_broken_rhythm_is_discarded() {
        let options = ParseOptions::default();
        let mut collector = FeedbackCollector::new();
        let tokens = tokenize("L:1/8\nA>|B", &options, &mut collector);
        let tokens = resolve(tokens, &options, &mut collector).unwrap();
        assert_eq!(context(&tokens, 0).broken_rhythm, None);
        assert_eq!(context(&tokens, 1).broken_rhythm, None);
        assert_eq!(collector.feedback().len(), 1);
    }

    #[test]
    fn test_articulations_consumed_once() {
        let tokens = run("L:1/8\n.uA B").unwrap();
        assert_eq!(
            context(&tokens, 0).articulations,
            vec![Articulation::Staccato, Articulation::UpBow]
        );
        assert!(context(&tokens, 1).articulations.is_empty());
    }

    #[test]
    fn test_grace_notes() {
        let tokens = run("L:1/8\n{ga}A B").unwrap();
        assert!(context(&tokens, 0).in_grace);
        assert!(context(&tokens, 1).in_grace);
        assert!(!context(&tokens, 2).in_grace);
    }

    #[test]
    fn test_chords_get_context() {
        let tokens = run("L:1/4\n[CEG]2").unwrap();
        let chord = tokens[1].as_chord().unwrap();
        assert_eq!(
            chord.note.context.as_ref().unwrap().default_quarter_length,
            Ratio::from_integer(1)
        );
    }
}
