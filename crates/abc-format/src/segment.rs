//! Splitting token streams into tunes, voices and measures.
//!
//! Everything here works on whole token lists and does not care whether
//! they have been resolved yet, except where noted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::token::{BarToken, Token};

/// True when the text holds more than one `X:` tune.
pub fn defines_reference_numbers(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .filter_map(Token::as_metadata)
        .filter(|m| m.is_reference_number())
        .count()
        > 1
}

/// Split a tune book at its `X:` fields.
///
/// Without any `X:` everything lands under `None`. Text before the first
/// `X:` is kept under `None` when there is any. A repeated number is
/// appended to the earlier tune with that number.
pub fn split_by_reference_number(tokens: Vec<Token>) -> BTreeMap<Option<u32>, Vec<Token>> {
    let mut tunes: BTreeMap<Option<u32>, Vec<Token>> = BTreeMap::new();
    let mut current: Option<u32> = None;

    for token in tokens {
        if let Some(number) = token
            .as_metadata()
            .filter(|m| m.is_reference_number())
            .map(|m| m.reference_number())
        {
            if tunes.contains_key(&number) {
                warn!(reference = ?number, "Duplicate reference number, appending to earlier tune");
            }
            current = number;
        }
        tunes.entry(current).or_default().push(token);
    }
    tunes
}

/// True when at least two plain `|` bars are present.
pub fn defines_measures(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .filter_map(Token::as_bar)
        .filter(|b| b.is_regular())
        .count()
        >= 2
}

/// Split at numbered `V:` fields. The first part holds whatever comes
/// before the first voice.
pub fn split_by_voice(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let starts: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.as_metadata().is_some_and(|m| m.is_numbered_voice()))
        .map(|(i, _)| i)
        .collect();
    if starts.len() < 2 {
        return vec![tokens];
    }

    let mut parts = Vec::with_capacity(starts.len() + 1);
    let mut rest = tokens;
    for &start in starts.iter().rev() {
        parts.push(rest.split_off(start));
    }
    parts.push(rest);
    parts.reverse();
    parts
}

/// One measure: its content plus the bars on either side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarDelimitedSequence {
    pub tokens: Vec<Token>,
    pub left_bar: Option<Token>,
    pub right_bar: Option<Token>,
}

impl BarDelimitedSequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        BarDelimitedSequence {
            tokens,
            left_bar: None,
            right_bar: None,
        }
    }

    pub fn has_notes(&self) -> bool {
        self.tokens.iter().any(Token::is_note_or_chord)
    }

    pub fn left_bar_token(&self) -> Option<&BarToken> {
        self.left_bar.as_ref().and_then(Token::as_bar)
    }

    pub fn right_bar_token(&self) -> Option<&BarToken> {
        self.right_bar.as_ref().and_then(Token::as_bar)
    }

    /// Tokens followed by `other`'s; where both sides have a bar the later
    /// one is kept.
    pub fn merge(self, other: BarDelimitedSequence) -> BarDelimitedSequence {
        let mut tokens = self.tokens;
        tokens.extend(other.tokens);
        BarDelimitedSequence {
            tokens,
            left_bar: pick_bar(self.left_bar, other.left_bar, "left"),
            right_bar: pick_bar(self.right_bar, other.right_bar, "right"),
        }
    }

    /// Everything back in source order, bars included.
    pub fn into_tokens(self) -> Vec<Token> {
        self.left_bar
            .into_iter()
            .chain(self.tokens)
            .chain(self.right_bar)
            .collect()
    }
}

fn pick_bar(old: Option<Token>, new: Option<Token>, side: &str) -> Option<Token> {
    match (old, new) {
        (Some(old), Some(new)) => {
            if old.src != new.src {
                warn!(side, old = %old.src, new = %new.src, "Conflicting bars while merging, keeping the later one");
            }
            Some(new)
        }
        (old, new) => new.or(old),
    }
}

/// Cut points for [`split_by_measure`]: bars, and metadata directly ahead
/// of a note (the start of a pickup).
fn measure_boundaries(tokens: &[Token]) -> Vec<usize> {
    let mut boundaries: Vec<usize> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let pickup = token.as_metadata().is_some()
            && tokens.get(i + 1).is_some_and(Token::is_note_or_chord);
        if !(token.is_bar() || pickup) {
            continue;
        }
        // adjacent cuts collapse onto the later one
        if boundaries.last().is_some_and(|last| last + 1 == i) {
            boundaries.pop();
        }
        boundaries.push(i);
    }
    boundaries
}

/// Split into measures.
pub fn split_by_measure(tokens: Vec<Token>) -> Vec<BarDelimitedSequence> {
    let boundaries = measure_boundaries(&tokens);
    let mut spans: Vec<Vec<Token>> = Vec::with_capacity(boundaries.len() + 1);
    let mut rest = tokens;
    for &cut in boundaries.iter().rev() {
        spans.push(rest.split_off(cut));
    }
    spans.push(rest);
    spans.reverse();

    let span_count = spans.len();
    let mut measures: Vec<BarDelimitedSequence> = Vec::with_capacity(span_count);
    for (index, mut span) in spans.into_iter().enumerate() {
        if span.is_empty() {
            continue;
        }

        let lone_bar = span.len() == 1 && span[0].is_bar();
        if lone_bar && index + 1 == span_count {
            match measures.last_mut() {
                Some(previous) if previous.right_bar.is_none() => {
                    previous.right_bar = span.pop();
                }
                _ => debug!(bar = %span[0].src, "Dropping trailing bar with no measure"),
            }
            continue;
        }

        let mut measure = BarDelimitedSequence::default();
        let leading = span.first().and_then(Token::as_bar).copied();
        if leading.is_some_and(|b| !b.is_repeat_end()) {
            measure.left_bar = Some(span.remove(0));
        }
        let trailing = span.last().and_then(Token::as_bar).copied();
        if trailing.is_some_and(|b| !b.is_repeat_start()) {
            measure.right_bar = span.pop();
        }
        measure.tokens = span;

        if measure.tokens.is_empty() {
            debug!(
                left = ?measure.left_bar.as_ref().map(|t| &t.src),
                right = ?measure.right_bar.as_ref().map(|t| &t.src),
                "Dropping empty measure"
            );
            continue;
        }
        measures.push(measure);
    }
    measures
}

/// Fold measures without notes into the measure that follows them.
///
/// When at most one measure has notes the whole list collapses into a
/// single sequence. Metadata-only measures at the very end stay on their
/// own.
pub fn merge_leading_metadata(measures: Vec<BarDelimitedSequence>) -> Vec<BarDelimitedSequence> {
    if measures.iter().filter(|m| m.has_notes()).count() <= 1 {
        let tokens = measures
            .into_iter()
            .flat_map(BarDelimitedSequence::into_tokens)
            .collect();
        return vec![BarDelimitedSequence::new(tokens)];
    }

    let mut merged = Vec::with_capacity(measures.len());
    let mut pending: Option<BarDelimitedSequence> = None;
    for measure in measures {
        if measure.has_notes() {
            let measure = match pending.take() {
                Some(metadata) => metadata.merge(measure),
                None => measure,
            };
            merged.push(measure);
        } else {
            pending = Some(match pending.take() {
                Some(metadata) => metadata.merge(measure),
                None => measure,
            });
        }
    }
    merged.extend(pending);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseOptions;
    use crate::feedback::FeedbackCollector;
    use crate::parser::tokenizer::tokenize;
    use pretty_assertions::assert_eq;

    fn scan(src: &str) -> Vec<Token> {
        let mut collector = FeedbackCollector::new();
        tokenize(src, &ParseOptions::default(), &mut collector)
    }

    fn sources(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.src.as_str()).collect()
    }

    fn bar_src(bar: &Option<Token>) -> Option<&str> {
        bar.as_ref().map(|t| t.src.as_str())
    }

    #[test]
    fn test_defines_reference_numbers() {
        assert!(!defines_reference_numbers(&scan("X:1\nK:G\nABC")));
        assert!(defines_reference_numbers(&scan("X:1\nABC\nX:2\nDEF")));
    }

    #[test]
    fn test_split_by_reference_number() {
        let tunes = split_by_reference_number(scan("X:5\nT:One\nABC\nX:6\nT:Two\nDEF\n"));
        assert_eq!(tunes.keys().copied().collect::<Vec<_>>(), vec![Some(5), Some(6)]);
        for (number, tune) in &tunes {
            let first = tune[0].as_metadata().unwrap();
            assert!(first.is_reference_number());
            assert_eq!(first.reference_number(), *number);
        }
        assert_eq!(tunes[&Some(6)].len(), 5);
    }

    #[test]
    fn test_split_without_reference_number() {
        let tunes = split_by_reference_number(scan("T:Untitled\nABC"));
        assert_eq!(tunes.len(), 1);
        assert_eq!(tunes[&None].len(), 4);
    }

    #[test]
    fn test_split_keeps_leading_text() {
        let tunes = split_by_reference_number(scan("T:Book\nX:1\nA\nX:2\nB"));
        assert_eq!(tunes.len(), 3);
        assert_eq!(sources(&tunes[&None]), vec!["T:Book"]);
    }

    #[test]
    fn test_duplicate_reference_numbers_append() {
        let tunes = split_by_reference_number(scan("X:1\nA\nX:1\nB"));
        assert_eq!(tunes.len(), 1);
        assert_eq!(sources(&tunes[&Some(1)]), vec!["X:1", "A", "X:1", "B"]);
    }

    #[test]
    fn test_defines_measures() {
        assert!(!defines_measures(&scan("ABC||DEF|]")));
        assert!(defines_measures(&scan("ABC|DEF|")));
    }

    #[test]
    fn test_split_by_voice() {
        let tokens = scan("T:Duet\nK:C\nV:1\nABC|\nV:2\nDEF|\n");
        let parts = split_by_voice(tokens);
        assert_eq!(parts.len(), 3);
        assert_eq!(sources(&parts[0]), vec!["T:Duet", "K:C"]);
        assert_eq!(sources(&parts[1]), vec!["V:1", "A", "B", "C", "|"]);
        assert_eq!(sources(&parts[2]), vec!["V:2", "D", "E", "F", "|"]);
    }

    #[test]
    fn test_single_voice_passthrough() {
        let tokens = scan("V:1\nABC|");
        let parts = split_by_voice(tokens.clone());
        assert_eq!(parts, vec![tokens]);
    }

    #[test]
    fn test_split_by_measure() {
        let measures = split_by_measure(scan("ABC|DEF|GAB|"));
        assert_eq!(measures.len(), 3);
        assert_eq!(sources(&measures[0].tokens), vec!["A", "B", "C"]);
        assert_eq!(bar_src(&measures[0].left_bar), None);
        assert_eq!(sources(&measures[1].tokens), vec!["D", "E", "F"]);
        assert_eq!(bar_src(&measures[1].left_bar), Some("|"));
        assert_eq!(bar_src(&measures[2].left_bar), Some("|"));
        assert_eq!(bar_src(&measures[2].right_bar), Some("|"));
    }

    #[test]
    fn test_bidirectional_repeat_measures() {
        let measures = split_by_measure(scan("|:ABC::DEF:|"));
        assert_eq!(measures.len(), 2);
        assert_eq!(bar_src(&measures[0].left_bar), Some("|:"));
        assert_eq!(bar_src(&measures[0].right_bar), Some(":|"));
        assert_eq!(bar_src(&measures[1].left_bar), Some("|:"));
        assert_eq!(bar_src(&measures[1].right_bar), Some(":|"));
        assert_eq!(sources(&measures[1].tokens), vec!["D", "E", "F"]);
    }

    #[test]
    fn test_dangling_end_repeat_stays_content() {
        let measures = split_by_measure(scan("AB|C:|D"));
        assert_eq!(sources(&measures[2].tokens), vec![":|", "D"]);
        assert_eq!(bar_src(&measures[2].left_bar), None);
    }

    #[test]
    fn test_pickup_boundary() {
        let measures = split_by_measure(scan("M:6/8\nK:G\nd|gfe|"));
        assert_eq!(sources(&measures[0].tokens), vec!["M:6/8"]);
        assert_eq!(sources(&measures[1].tokens), vec!["K:G", "d"]);
        assert_eq!(sources(&measures[2].tokens), vec!["g", "f", "e"]);
    }

    #[test]
    fn test_measure_token_accounting() {
        let tokens = scan("X:1\nM:4/4\nL:1/8\nK:D\n|:d2fd ed cB|A2 FA d2 fa|1 g2 e2 :|2 d4 ||\n");
        assert!(defines_measures(&tokens));
        let total = tokens.len();
        let measures = split_by_measure(tokens);

        let content: usize = measures.iter().map(|m| m.tokens.len()).sum();
        let bars: usize = measures
            .iter()
            .map(|m| usize::from(m.left_bar.is_some()) + usize::from(m.right_bar.is_some()))
            .sum();
        assert_eq!(content + bars, total);
    }

    #[test]
    fn test_merge_leading_metadata() {
        let measures = split_by_measure(scan("T:Tune\nM:6/8\nK:G\nd|gfe|dBG|\nw:words"));
        let merged = merge_leading_metadata(measures);
        assert_eq!(merged.len(), 4);
        assert_eq!(
            sources(&merged[0].tokens),
            vec!["T:Tune", "M:6/8", "K:G", "d"]
        );
        assert_eq!(sources(&merged[3].tokens), vec!["w:words"]);
    }

    #[test]
    fn test_merge_single_measure_collapses() {
        let measures = split_by_measure(scan("T:Tune\nK:G\nABC|"));
        let merged = merge_leading_metadata(measures);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            sources(&merged[0].tokens),
            vec!["T:Tune", "K:G", "A", "B", "C", "|"]
        );
    }

    #[test]
    fn test_merge_prefers_later_bar() {
        let bar = |src: &str| scan(src).remove(0);
        let first = BarDelimitedSequence {
            tokens: scan("K:G"),
            left_bar: Some(bar("||")),
            right_bar: None,
        };
        let second = BarDelimitedSequence {
            tokens: scan("AB"),
            left_bar: Some(bar("|:")),
            right_bar: Some(bar("|")),
        };
        let merged = first.merge(second);
        assert_eq!(bar_src(&merged.left_bar), Some("|:"));
        assert_eq!(bar_src(&merged.right_bar), Some("|"));
        assert_eq!(sources(&merged.tokens), vec!["K:G", "A", "B"]);
    }
}
