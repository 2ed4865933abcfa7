//! Value objects handed to the translation layer.
//!
//! These are the only music-theory types the core knows about, and only as
//! far as resolving a token needs them (sharps count, beat division, ratio).

use std::fmt;

use num_rational::Ratio;
use serde::{Deserialize, Serialize};

/// Duration measured in quarter notes.
pub type QuarterLength = Ratio<u32>;

/// `a * b` computed in 64 bits, `None` if the reduced result overflows.
pub fn checked_product(a: QuarterLength, b: QuarterLength) -> Option<QuarterLength> {
    narrow(Ratio::new(
        u64::from(*a.numer()) * u64::from(*b.numer()),
        u64::from(*a.denom()) * u64::from(*b.denom()),
    ))
}

/// `a + b` computed in 64 bits, `None` if the reduced result overflows.
pub fn checked_sum(a: QuarterLength, b: QuarterLength) -> Option<QuarterLength> {
    let (a_numer, a_denom) = (u64::from(*a.numer()), u64::from(*a.denom()));
    let (b_numer, b_denom) = (u64::from(*b.numer()), u64::from(*b.denom()));
    let numer = (a_numer * b_denom).checked_add(b_numer * a_denom)?;
    narrow(Ratio::new(numer, a_denom * b_denom))
}

fn narrow(wide: Ratio<u64>) -> Option<QuarterLength> {
    Some(Ratio::new_raw(
        u32::try_from(*wide.numer()).ok()?,
        u32::try_from(*wide.denom()).ok()?,
    ))
}

/// Order in which key signatures add sharps (flats run the other way).
const SHARP_ORDER: [char; 7] = ['F', 'C', 'G', 'D', 'A', 'E', 'B'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Mode {
    #[default]
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
}

impl Mode {
    /// Match on the first three letters, case-insensitive.
    pub fn parse(s: &str) -> Option<Mode> {
        let s = s.to_lowercase();
        if s == "m" {
            return Some(Mode::Minor);
        }
        let prefix: String = s.chars().take(3).collect();
        match prefix.as_str() {
            "maj" | "ion" => Some(Mode::Major),
            "min" => Some(Mode::Minor),
            "dor" => Some(Mode::Dorian),
            "phr" => Some(Mode::Phrygian),
            "lyd" => Some(Mode::Lydian),
            "mix" => Some(Mode::Mixolydian),
            "aeo" => Some(Mode::Aeolian),
            "loc" => Some(Mode::Locrian),
            _ => None,
        }
    }

    /// Shift from the major key on the same tonic, in sharps.
    pub fn sharps_offset(&self) -> i8 {
        match self {
            Mode::Major => 0,
            Mode::Lydian => 1,
            Mode::Mixolydian => -1,
            Mode::Dorian => -2,
            Mode::Minor | Mode::Aeolian => -3,
            Mode::Phrygian => -4,
            Mode::Locrian => -5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
            Mode::Dorian => "dorian",
            Mode::Phrygian => "phrygian",
            Mode::Lydian => "lydian",
            Mode::Mixolydian => "mixolydian",
            Mode::Aeolian => "aeolian",
            Mode::Locrian => "locrian",
        }
    }
}

/// Key signature: positive sharps, negative flats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySignature {
    pub sharps: i8,
    pub mode: Option<Mode>,
}

impl KeySignature {
    pub fn new(sharps: i8, mode: Option<Mode>) -> Self {
        KeySignature { sharps, mode }
    }

    /// Semitone alteration this signature applies to `step` (an upper-case
    /// letter A-G).
    pub fn alteration(&self, step: char) -> i8 {
        let step = step.to_ascii_uppercase();
        let count = self.sharps.unsigned_abs() as usize;
        if self.sharps > 0 {
            let sharpened = SHARP_ORDER.iter().cycle().take(count);
            sharpened.filter(|s| **s == step).count() as i8
        } else if self.sharps < 0 {
            let flattened = SHARP_ORDER.iter().rev().cycle().take(count);
            -(flattened.filter(|s| **s == step).count() as i8)
        } else {
            0
        }
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.sharps.unsigned_abs();
        let kind = if self.sharps < 0 { "flat" } else { "sharp" };
        let plural = if count == 1 { "" } else { "s" };
        write!(f, "<KeySignature of {count} {kind}{plural}")?;
        if let Some(mode) = self.mode {
            write!(f, ", {}", mode.name())?;
        }
        write!(f, ">")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterSymbol {
    Common, // C
    Cut,    // C|
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
    pub symbol: MeterSymbol,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        TimeSignature {
            numerator,
            denominator,
            symbol: MeterSymbol::Normal,
        }
    }

    pub fn common() -> Self {
        TimeSignature {
            numerator: 4,
            denominator: 4,
            symbol: MeterSymbol::Common,
        }
    }

    pub fn cut() -> Self {
        TimeSignature {
            numerator: 2,
            denominator: 2,
            symbol: MeterSymbol::Cut,
        }
    }

    /// Compound meters (6/8, 9/8, 12/8, 3/8) divide the beat in three.
    pub fn beat_division_count(&self) -> u8 {
        if self.denominator >= 8 && self.numerator % 3 == 0 {
            3
        } else {
            2
        }
    }

    pub fn is_compound(&self) -> bool {
        self.beat_division_count() == 3
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Clef {
    #[default]
    Treble,
    Bass,
    Alto,
    Tenor,
    Percussion,
}

impl Clef {
    pub fn parse(s: &str) -> Option<Clef> {
        match s.to_lowercase().as_str() {
            "treble" | "treble-8" | "treble+8" | "g" | "g2" => Some(Clef::Treble),
            "bass" | "bass-8" | "bass+8" | "f" | "f4" => Some(Clef::Bass),
            "alto" | "c" | "c3" => Some(Clef::Alto),
            "tenor" | "c4" => Some(Clef::Tenor),
            "perc" | "percussion" | "drum" => Some(Clef::Percussion),
            _ => None,
        }
    }
}

/// Tempo from a Q: field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetronomeMark {
    pub number: Option<u32>,
    /// Beat the number counts
    pub referent: QuarterLength,
    pub text: Option<String>,
}

/// `actual` notes in the time of `normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupletRatio {
    pub actual: u32,
    pub normal: u32,
}

impl TupletRatio {
    pub fn new(actual: u32, normal: u32) -> Self {
        TupletRatio { actual, normal }
    }

    /// Factor applied to each note's written length.
    pub fn multiplier(&self) -> QuarterLength {
        Ratio::new(self.normal, self.actual.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpannerKind {
    Slur,
    Crescendo,
    Diminuendo,
}

/// Handle to one open spanner; notes under it share the same `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpannerRef {
    pub id: usize,
    pub kind: SpannerKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("maj"), Some(Mode::Major));
        assert_eq!(Mode::parse("m"), Some(Mode::Minor));
        assert_eq!(Mode::parse("Minor"), Some(Mode::Minor));
        assert_eq!(Mode::parse("DORIAN"), Some(Mode::Dorian));
        assert_eq!(Mode::parse("Mixolydian"), Some(Mode::Mixolydian));
        assert_eq!(Mode::parse("phr"), Some(Mode::Phrygian));
        assert_eq!(Mode::parse("xyz"), None);
    }

    #[test]
    fn test_key_signature_alterations() {
        let a_major = KeySignature::new(3, Some(Mode::Major));
        assert_eq!(a_major.alteration('F'), 1);
        assert_eq!(a_major.alteration('c'), 1);
        assert_eq!(a_major.alteration('G'), 1);
        assert_eq!(a_major.alteration('D'), 0);

        let e_flat = KeySignature::new(-3, None);
        assert_eq!(e_flat.alteration('B'), -1);
        assert_eq!(e_flat.alteration('E'), -1);
        assert_eq!(e_flat.alteration('A'), -1);
        assert_eq!(e_flat.alteration('D'), 0);
    }

    #[test]
    fn test_key_signature_display() {
        assert_eq!(
            KeySignature::new(1, Some(Mode::Major)).to_string(),
            "<KeySignature of 1 sharp, major>"
        );
        assert_eq!(
            KeySignature::new(-2, None).to_string(),
            "<KeySignature of 2 flats>"
        );
    }

    #[test]
    fn test_beat_division() {
        assert_eq!(TimeSignature::new(6, 8).beat_division_count(), 3);
        assert_eq!(TimeSignature::new(9, 8).beat_division_count(), 3);
        assert_eq!(TimeSignature::new(3, 4).beat_division_count(), 2);
        assert_eq!(TimeSignature::common().beat_division_count(), 2);
    }

    #[test]
    fn test_checked_arithmetic() {
        let big = Ratio::from_integer(u32::MAX);
        assert_eq!(
            checked_product(Ratio::new(3, 4), Ratio::new(2, 3)),
            Some(Ratio::new(1, 2))
        );
        assert_eq!(checked_product(big, Ratio::new(1, 2)), Some(Ratio::new(u32::MAX, 2)));
        assert_eq!(checked_product(big, Ratio::new(3, 2)), None);
        // reduces before narrowing
        assert_eq!(checked_product(big, Ratio::new(2, 4)), Some(Ratio::new(u32::MAX, 2)));

        assert_eq!(
            checked_sum(Ratio::new(1, 4), Ratio::new(1, 8)),
            Some(Ratio::new(3, 8))
        );
        assert_eq!(checked_sum(big, Ratio::from_integer(1)), None);
    }

    #[test]
    fn test_tuplet_multiplier() {
        assert_eq!(TupletRatio::new(3, 2).multiplier(), Ratio::new(2, 3));
    }
}
