//! Pitch and duration resolution for note lexemes.
//!
//! Everything here is a pure function of the lexeme and the context passed
//! in; the pitch half is memoised by [`crate::pitch_cache::PitchCache`].

use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use crate::error::{AbcError, Result, TokenContext};
use crate::music::{checked_product, KeySignature, QuarterLength, TupletRatio};

type PResult<T> = winnow::ModalResult<T>;

/// Decoration shorthands that may precede the accidentals and pitch letter.
const ORNAMENTS: [char; 17] = [
    '~', '.', 'u', 'v', 'h', 'w', 'H', 'L', 'T', 'S', 'M', 'N', 'O', 'P', 'R', 'k', 'K',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Which broken-rhythm marker a note takes part in, and on which side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenRhythm {
    pub marker: String,
    pub side: Side,
}

impl BrokenRhythm {
    pub fn new(marker: impl Into<String>, side: Side) -> Self {
        BrokenRhythm {
            marker: marker.into(),
            side,
        }
    }

    pub fn multiplier(&self) -> Option<QuarterLength> {
        let (left, right) = broken_rhythm_multipliers(&self.marker)?;
        Some(match self.side {
            Side::Left => left,
            Side::Right => right,
        })
    }
}

/// (left, right) length factors for a broken-rhythm marker.
pub fn broken_rhythm_multipliers(marker: &str) -> Option<(QuarterLength, QuarterLength)> {
    let pair = match marker {
        ">" => ((3, 2), (1, 2)),
        "<" => ((1, 2), (3, 2)),
        ">>" => ((7, 4), (1, 4)),
        "<<" => ((1, 4), (7, 4)),
        ">>>" => ((15, 8), (1, 8)),
        "<<<" => ((1, 8), (15, 8)),
        _ => return None,
    };
    let ((ln, ld), (rn, rd)) = pair;
    Some((Ratio::new(ln, ld), Ratio::new(rn, rd)))
}

/// The pieces of a note lexeme that matter for pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchParts {
    pub sharps: u8,
    pub flats: u8,
    pub naturals: u8,
    /// `a-g`, `A-G`, `z` or `Z`
    pub letter: char,
    pub octave_shift: i32,
}

impl PitchParts {
    pub fn is_rest(&self) -> bool {
        matches!(self.letter, 'z' | 'Z')
    }

    pub fn has_accidental(&self) -> bool {
        self.sharps + self.flats + self.naturals > 0
    }
}

fn pitch_parts(input: &mut &str) -> PResult<PitchParts> {
    let prefix: &str = take_while(0.., |c: char| {
        ORNAMENTS.contains(&c) || matches!(c, '^' | '_' | '=')
    })
    .parse_next(input)?;
    let letter = one_of(|c: char| matches!(c, 'a'..='g' | 'A'..='G' | 'z' | 'Z')).parse_next(input)?;
    let marks: &str = take_while(0.., [',', '\'']).parse_next(input)?;

    let count = |glyph: char| prefix.chars().filter(|c| *c == glyph).count() as u8;
    let ups = marks.chars().filter(|c| *c == '\'').count() as i32;
    let downs = marks.chars().filter(|c| *c == ',').count() as i32;

    Ok(PitchParts {
        sharps: count('^'),
        flats: count('_'),
        naturals: count('='),
        letter,
        octave_shift: ups - downs,
    })
}

/// Split a lexeme into pitch parts, failing if there is no pitch letter.
pub fn parse_pitch_parts(body: &str) -> Result<PitchParts> {
    let mut input = body;
    pitch_parts
        .parse_next(&mut input)
        .map_err(|_| AbcError::MissingPitch {
            src: body.to_string(),
            context: TokenContext::new(body),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPitch {
    pub pitch_name: Option<String>,
    pub is_rest: bool,
    /// `Some(true)` written accidental, `Some(false)` implied by the key,
    /// `None` no accidental at all
    pub accidental_display_status: Option<bool>,
}

fn accidental_spelling(alteration: i32) -> String {
    if alteration > 0 {
        "#".repeat(alteration as usize)
    } else {
        "-".repeat(alteration.unsigned_abs() as usize)
    }
}

/// Resolve the pitch of a note lexeme such as `^g'` against a key.
pub fn resolve_pitch(body: &str, key: Option<&KeySignature>) -> Result<ResolvedPitch> {
    let parts = parse_pitch_parts(body)?;
    if parts.is_rest() {
        return Ok(ResolvedPitch {
            pitch_name: None,
            is_rest: true,
            accidental_display_status: None,
        });
    }

    let step = parts.letter.to_ascii_uppercase();
    let base_octave = if parts.letter.is_ascii_lowercase() { 5 } else { 4 };
    let octave = base_octave + parts.octave_shift;

    let (accidental, display) = if parts.has_accidental() {
        let alteration = parts.sharps as i32 - parts.flats as i32;
        let spelled = if alteration == 0 {
            "n".to_string()
        } else {
            accidental_spelling(alteration)
        };
        (spelled, Some(true))
    } else {
        match key.map(|k| k.alteration(step)) {
            Some(alteration) if alteration != 0 => {
                (accidental_spelling(alteration as i32), Some(false))
            }
            _ => (String::new(), None),
        }
    };

    Ok(ResolvedPitch {
        pitch_name: Some(format!("{step}{accidental}{octave}")),
        is_rest: false,
        accidental_display_status: display,
    })
}

/// Duration of a lexeme, and whether its suffix had to be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDuration {
    pub quarter_length: QuarterLength,
    pub malformed: bool,
}

/// Multiplier written after the pitch: `2`, `/`, `//`, `3/2`, `3/`, `/4`.
pub fn duration_multiplier(body: &str) -> (QuarterLength, bool) {
    let suffix: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '/')
        .collect();
    let one = Ratio::from_integer(1);

    if suffix.is_empty() {
        return (one, false);
    }
    if suffix.chars().all(|c| c == '/') {
        return (Ratio::new(1, 1 << suffix.len().min(16)), false);
    }

    let parts: Vec<&str> = suffix.split('/').collect();
    match parts.as_slice() {
        [numerator] => match numerator.parse::<u32>() {
            Ok(n) => (Ratio::from_integer(n), false),
            Err(_) => (one, true),
        },
        [numerator, denominator] => {
            let n = if numerator.is_empty() {
                Ok(1)
            } else {
                numerator.parse::<u32>()
            };
            let d = if denominator.is_empty() {
                Ok(2)
            } else {
                denominator.parse::<u32>()
            };
            match (n, d) {
                (Ok(n), Ok(d)) if d > 0 => (Ratio::new(n, d), false),
                _ => (one, true),
            }
        }
        // two or more slashes mixed with digits
        _ => (one, true),
    }
}

/// Full duration: default length × written multiplier × broken rhythm ×
/// tuplet ratio.
///
/// A multiplier too large to represent is treated like any other unreadable
/// suffix: the note keeps its default length and is flagged malformed.
pub fn quarter_length(
    body: &str,
    default_quarter_length: QuarterLength,
    broken_rhythm: Option<&BrokenRhythm>,
    tuplet: Option<&TupletRatio>,
) -> ParsedDuration {
    let (multiplier, malformed) = duration_multiplier(body);
    let scaled = checked_product(default_quarter_length, multiplier)
        .and_then(|length| scale_by_rhythm(length, broken_rhythm, tuplet));
    match scaled {
        Some(quarter_length) => ParsedDuration {
            quarter_length,
            malformed,
        },
        None => ParsedDuration {
            quarter_length: scale_by_rhythm(default_quarter_length, broken_rhythm, tuplet)
                .unwrap_or(default_quarter_length),
            malformed: true,
        },
    }
}

/// Apply broken-rhythm and tuplet factors; `None` on overflow.
pub fn scale_by_rhythm(
    length: QuarterLength,
    broken_rhythm: Option<&BrokenRhythm>,
    tuplet: Option<&TupletRatio>,
) -> Option<QuarterLength> {
    let mut length = length;
    if let Some(factor) = broken_rhythm.and_then(BrokenRhythm::multiplier) {
        length = checked_product(length, factor)?;
    }
    if let Some(tuplet) = tuplet {
        length = checked_product(length, tuplet.multiplier())?;
    }
    Some(length)
}
