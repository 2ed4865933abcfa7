//! Bar line and repeat classification.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarType {
    Barline,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarStyle {
    Regular,
    LightHeavy, // |]
    LightLight, // ||
    HeavyLight, // [|
    Dotted,     // :
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatForm {
    Start,
    End,
    First,
    Second,
    Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatDirection {
    Start,
    End,
    Both,
}

/// Bar object handed to the translation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarObject {
    Barline {
        style: BarStyle,
    },
    Repeat {
        direction: RepeatDirection,
        style: BarStyle,
        /// 1 or 2 for `:|1` / `:|2`
        ending: Option<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarToken {
    pub bar_type: BarType,
    pub bar_style: BarStyle,
    pub repeat_form: Option<RepeatForm>,
}

impl BarToken {
    pub fn is_regular(&self) -> bool {
        self.bar_style == BarStyle::Regular
    }

    pub fn is_repeat_start(&self) -> bool {
        self.repeat_form == Some(RepeatForm::Start)
    }

    pub fn is_repeat_end(&self) -> bool {
        self.bar_type == BarType::Repeat && self.repeat_form == Some(RepeatForm::End)
    }

    /// `[1` / `|1` style ending markers
    pub fn is_ending(&self) -> bool {
        self.bar_type == BarType::Barline
            && matches!(self.repeat_form, Some(RepeatForm::First | RepeatForm::Second))
    }

    pub fn bar_object(&self) -> BarObject {
        match self.bar_type {
            BarType::Barline => BarObject::Barline {
                style: self.bar_style,
            },
            BarType::Repeat => {
                let (direction, ending) = match self.repeat_form {
                    Some(RepeatForm::Start) => (RepeatDirection::Start, None),
                    Some(RepeatForm::Bidirectional) => (RepeatDirection::Both, None),
                    Some(RepeatForm::First) => (RepeatDirection::End, Some(1)),
                    Some(RepeatForm::Second) => (RepeatDirection::End, Some(2)),
                    Some(RepeatForm::End) | None => (RepeatDirection::End, None),
                };
                BarObject::Repeat {
                    direction,
                    style: self.bar_style,
                    ending,
                }
            }
        }
    }
}

/// Bar glyphs, longest first so `:|1` wins over `:|` and `|`.
pub(crate) const BAR_LEXEMES: [&str; 14] = [
    ":|1", ":|2", "|]", "||", "[|", "[1", "[2", "|1", "|2", ":|", "|:", "::", "|", ":",
];

/// Classify a bar lexeme from [`BAR_LEXEMES`].
pub fn classify_bar(lexeme: &str) -> Option<BarToken> {
    use BarStyle::*;
    use BarType::*;

    let (bar_type, bar_style, repeat_form) = match lexeme {
        ":|1" => (Repeat, LightHeavy, Some(RepeatForm::First)),
        ":|2" => (Repeat, LightHeavy, Some(RepeatForm::Second)),
        "|]" => (Barline, LightHeavy, None),
        "||" => (Barline, LightLight, None),
        "[|" => (Barline, HeavyLight, None),
        "[1" | "|1" => (Barline, Regular, Some(RepeatForm::First)),
        "[2" | "|2" => (Barline, Regular, Some(RepeatForm::Second)),
        ":|" => (Repeat, LightHeavy, Some(RepeatForm::End)),
        "|:" => (Repeat, HeavyLight, Some(RepeatForm::Start)),
        "::" => (Repeat, LightHeavy, Some(RepeatForm::Bidirectional)),
        "|" => (Barline, Regular, None),
        ":" => (Barline, Dotted, None),
        _ => return None,
    };
    Some(BarToken {
        bar_type,
        bar_style,
        repeat_form,
    })
}

/// Lexemes that stand for two bar functions at once.
pub(crate) fn split_bar_lexeme(lexeme: &str) -> Option<[&'static str; 2]> {
    match lexeme {
        "::" => Some([":|", "|:"]),
        "|1" => Some(["|", "[1"]),
        "|2" => Some(["|", "[2"]),
        ":|1" => Some([":|", "[1"]),
        ":|2" => Some([":|", "[2"]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_lexeme_classifies() {
        for lexeme in BAR_LEXEMES {
            assert!(classify_bar(lexeme).is_some(), "{lexeme} unclassified");
        }
        assert_eq!(classify_bar("|||"), None);
    }

    #[test]
    fn test_repeat_classification() {
        let end = classify_bar(":|").unwrap();
        assert_eq!(end.bar_type, BarType::Repeat);
        assert!(end.is_repeat_end());
        assert_eq!(
            end.bar_object(),
            BarObject::Repeat {
                direction: RepeatDirection::End,
                style: BarStyle::LightHeavy,
                ending: None
            }
        );

        let start = classify_bar("|:").unwrap();
        assert!(start.is_repeat_start());
    }

    #[test]
    fn test_ending_markers() {
        let first = classify_bar("[1").unwrap();
        assert!(first.is_ending());
        assert!(first.is_regular());
        assert_eq!(
            first.bar_object(),
            BarObject::Barline {
                style: BarStyle::Regular
            }
        );
        assert!(!classify_bar("|").unwrap().is_ending());
    }

    #[test]
    fn test_split_lexemes() {
        assert_eq!(split_bar_lexeme("::"), Some([":|", "|:"]));
        assert_eq!(split_bar_lexeme(":|2"), Some([":|", "[2"]));
        assert_eq!(split_bar_lexeme("|"), None);
    }
}
