//! Information field lines (`X:`, `T:`, `M:`, `L:`, `K:`, `Q:`, `V:` ...)
//! and the value objects derived from them.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use winnow::ascii::digit1;
use winnow::prelude::*;
use winnow::token::take_till;

use crate::music::{
    checked_sum, Clef, KeySignature, MetronomeMark, Mode, QuarterLength, TimeSignature,
};

type PResult<T> = winnow::ModalResult<T>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataToken {
    pub tag: char,
    /// Text after the colon, comment stripped and trimmed
    pub data: String,
}

impl MetadataToken {
    pub fn new(tag: char, data: impl Into<String>) -> Self {
        MetadataToken {
            tag,
            data: data.into(),
        }
    }

    /// Split a `T:data % comment` line.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut chars = line.trim_start().chars();
        let tag = chars.next()?;
        let rest = chars.as_str().strip_prefix(':')?;
        let data = match rest.find('%') {
            Some(pos) => &rest[..pos],
            None => rest,
        };
        Some(MetadataToken::new(tag, data.trim()))
    }

    pub fn is_reference_number(&self) -> bool {
        self.tag == 'X'
    }

    pub fn is_title(&self) -> bool {
        self.tag == 'T'
    }

    pub fn is_meter(&self) -> bool {
        self.tag == 'M'
    }

    pub fn is_default_note_length(&self) -> bool {
        self.tag == 'L'
    }

    pub fn is_key(&self) -> bool {
        self.tag == 'K'
    }

    pub fn is_tempo(&self) -> bool {
        self.tag == 'Q'
    }

    pub fn is_voice(&self) -> bool {
        self.tag == 'V'
    }

    /// `V:1`, `V:2 clef=bass` (numbered voices are the ones that split parts)
    pub fn is_numbered_voice(&self) -> bool {
        self.is_voice() && self.data.starts_with(|c: char| c.is_ascii_digit())
    }

    pub fn reference_number(&self) -> Option<u32> {
        if !self.is_reference_number() {
            return None;
        }
        let digits: String = self
            .data
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }

    pub fn voice_id(&self) -> Option<&str> {
        if !self.is_voice() {
            return None;
        }
        self.data.split_whitespace().next()
    }

    pub fn time_signature(&self) -> Option<TimeSignature> {
        if !self.is_meter() {
            return None;
        }
        parse_time_signature(&self.data)
    }

    pub fn key_signature(&self) -> Option<KeySignature> {
        if !self.is_key() {
            return None;
        }
        parse_key_signature(&self.data)
    }

    /// Clef named on a `K:` or `V:` line.
    pub fn clef(&self) -> Option<Clef> {
        if !(self.is_key() || self.is_voice()) {
            return None;
        }
        self.data.split_whitespace().find_map(|word| match word.split_once('=') {
            Some((name, value)) if name.eq_ignore_ascii_case("clef") => Clef::parse(value),
            Some(_) => None,
            None => match word.to_lowercase().as_str() {
                "treble" | "bass" | "alto" | "tenor" | "perc" => Clef::parse(word),
                _ => None,
            },
        })
    }

    /// Tempo from a `Q:` line. Bare numbers count `default_quarter_length`
    /// beats, or quarters when no default is known.
    pub fn metronome_mark(&self, default_quarter_length: Option<QuarterLength>) -> Option<MetronomeMark> {
        if !self.is_tempo() {
            return None;
        }
        Some(parse_metronome_mark(&self.data, default_quarter_length))
    }

    /// Explicit for `L:`, inferred for `M:`, `None` otherwise.
    pub fn default_quarter_length(&self) -> Option<QuarterLength> {
        if self.is_default_note_length() {
            parse_default_length(&self.data)
        } else if self.is_meter() {
            Some(default_quarter_length_from_meter(self.time_signature().as_ref()))
        } else {
            None
        }
    }
}

/// First run of digits anywhere in the input.
fn first_number(input: &mut &str) -> PResult<u32> {
    take_till(0.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    digit1.parse_to().parse_next(input)
}

fn number_in(s: &str) -> Option<u32> {
    let mut input = s;
    first_number.parse_next(&mut input).ok()
}

/// `C`, `C|`, `none`, `6/8`, and garbage like `FREI4/4`.
pub fn parse_time_signature(data: &str) -> Option<TimeSignature> {
    let trimmed = data.trim();
    match trimmed {
        "C" => return Some(TimeSignature::common()),
        "C|" => return Some(TimeSignature::cut()),
        _ if trimmed.eq_ignore_ascii_case("none") => return None,
        _ => {}
    }
    let (numerator, denominator) = trimmed.split_once('/')?;
    let numerator = number_in(numerator)?;
    let denominator = number_in(denominator)?;
    if denominator == 0 {
        return None;
    }
    Some(TimeSignature::new(numerator, denominator))
}

/// `L:1/8` as quarter lengths. A non-numeric denominator (`1/G` turns up
/// in the wild) is read as 4; a numerator too large to scale gives `None`.
pub fn parse_default_length(data: &str) -> Option<QuarterLength> {
    let trimmed = data.trim();
    let (numerator, denominator) = match trimmed.split_once('/') {
        Some((n, d)) => (number_in(n)?, number_in(d).filter(|d| *d > 0).unwrap_or(4)),
        None => (number_in(trimmed)?, 1),
    };
    Some(Ratio::new(numerator.checked_mul(4)?, denominator))
}

/// Default length when only the meter is known: sixteenths below 3/4,
/// eighths otherwise.
pub fn default_quarter_length_from_meter(meter: Option<&TimeSignature>) -> QuarterLength {
    match meter {
        Some(ts) if Ratio::new(ts.numerator, ts.denominator.max(1)) < Ratio::new(3, 4) => {
            Ratio::new(1, 4)
        }
        _ => Ratio::new(1, 2),
    }
}

/// Sharps in the major key on each tonic.
fn major_sharps(tonic: &str) -> Option<i8> {
    Some(match tonic {
        "c" => 0,
        "g" => 1,
        "d" => 2,
        "a" => 3,
        "e" => 4,
        "b" => 5,
        "f#" => 6,
        "c#" => 7,
        "g#" => 8,
        "d#" => 9,
        "a#" => 10,
        "e#" => 11,
        "f" => -1,
        "bb" => -2,
        "eb" => -3,
        "ab" => -4,
        "db" => -5,
        "gb" => -6,
        "cb" => -7,
        "fb" => -8,
        _ => return None,
    })
}

/// `K:` data to a key signature; `None` for `K:none`, empty or unreadable
/// keys.
pub fn parse_key_signature(data: &str) -> Option<KeySignature> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return None;
    }
    // Highland pipes: HP is written without a signature, Hp marks F# C# G#.
    if trimmed.starts_with("HP") {
        return Some(KeySignature::new(0, None));
    }
    if trimmed.starts_with("Hp") {
        return Some(KeySignature::new(3, None));
    }

    let lower = trimmed.to_lowercase();
    let (tonic, rest) = [2, 1]
        .into_iter()
        .filter_map(|len| {
            let tonic = lower.get(..len)?;
            major_sharps(tonic).map(|_| (tonic, &lower[len..]))
        })
        .next()?;
    let sharps = major_sharps(tonic)?;

    let mode = rest
        .split_whitespace()
        .next()
        .filter(|word| !word.contains('='))
        .and_then(Mode::parse);
    let offset = mode.map(|m| m.sharps_offset()).unwrap_or(0);

    Some(KeySignature::new(sharps + offset, mode))
}

fn beat_fraction(input: &mut &str) -> PResult<QuarterLength> {
    let quarters: u32 = digit1
        .parse_to()
        .verify_map(|n: u32| n.checked_mul(4))
        .parse_next(input)?;
    '/'.parse_next(input)?;
    let denominator: u32 = digit1
        .parse_to()
        .verify(|d: &u32| *d > 0)
        .parse_next(input)?;
    Ok(Ratio::new(quarters, denominator))
}

/// `"Allegro" 1/4=120`, `3/8=60`, `1/4 1/8=80`, `C=100`, `120`.
pub fn parse_metronome_mark(data: &str, default_quarter_length: Option<QuarterLength>) -> MetronomeMark {
    let mut text = None;
    let mut rest = data.trim().to_string();
    if let Some(start) = rest.find('"') {
        if let Some(len) = rest[start + 1..].find('"') {
            let end = start + 1 + len;
            text = Some(rest[start + 1..end].to_string());
            rest.replace_range(start..=end, "");
        }
    }
    let rest = rest.trim();
    let fallback_referent = default_quarter_length.unwrap_or_else(|| Ratio::from_integer(1));

    let (referent, number) = match rest.split_once('=') {
        Some((beats, bpm)) => {
            let mut referent = Ratio::from_integer(0);
            for beat in beats.split_whitespace() {
                let mut input = beat;
                if let Ok(fraction) = beat_fraction.parse_next(&mut input) {
                    referent = checked_sum(referent, fraction).unwrap_or(referent);
                }
            }
            if referent == Ratio::from_integer(0) {
                referent = fallback_referent;
            }
            (referent, number_in(bpm))
        }
        None if rest.is_empty() => (Ratio::from_integer(1), None),
        None => (fallback_referent, number_in(rest)),
    };

    MetronomeMark {
        number,
        referent,
        text,
    }
}
