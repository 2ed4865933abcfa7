//! Single forward scan from ABC text to a flat token list.
//!
//! Only local decisions are made here: which lexeme starts at the cursor
//! and how far it reaches. Anything that depends on other tokens is left to
//! the resolver.

use crate::config::ParseOptions;
use crate::feedback::FeedbackCollector;
use crate::token::{
    classify_bar, split_bar_lexeme, ChordToken, MetadataToken, NoteToken, Token, TokenKind,
    TupletToken, BAR_LEXEMES,
};

/// Characters that can precede the pitch letter of a note lexeme.
const PRE_PITCH: &str = "~=^_vHLTS";

/// Letters that never act as the pitch letter.
const NOT_PITCH: &str = "~wuvhHLTSN";

/// Cursor over the source with line/column tracking.
struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Scanner {
    fn new(src: &str) -> Self {
        Scanner {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, lexeme: &str) -> bool {
        lexeme
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek(i) == Some(c))
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end.min(self.chars.len())].iter().collect()
    }

    /// Offset of the first `target` after the cursor, searching at most
    /// `limit` characters.
    fn find(&self, target: char, limit: usize) -> Option<usize> {
        (1..=limit)
            .take_while(|i| self.pos + i < self.chars.len())
            .find(|i| self.chars[self.pos + i] == target)
    }

    fn advance(&mut self, count: usize) {
        for _ in 0..count {
            match self.chars.get(self.pos) {
                Some('\n') => {
                    self.line += 1;
                    self.column = 1;
                }
                Some(_) => self.column += 1,
                None => return,
            }
            self.pos += 1;
        }
    }

    /// Consume up to (not including) the next newline and return it.
    fn take_line(&mut self) -> String {
        let start = self.pos;
        let len = self.chars[start..]
            .iter()
            .position(|c| *c == '\n')
            .unwrap_or(self.chars.len() - start);
        self.advance(len);
        self.slice(start, start + len)
    }
}

/// Scan `src` into tokens.
pub fn tokenize(src: &str, options: &ParseOptions, collector: &mut FeedbackCollector) -> Vec<Token> {
    Tokenizer::new(src, options, collector).run()
}

struct Tokenizer<'a> {
    scanner: Scanner,
    options: &'a ParseOptions,
    collector: &'a mut FeedbackCollector,
    tokens: Vec<Token>,
    /// Chord symbols waiting for the next note or chord: (text, raw source)
    pending_symbols: Vec<(String, String)>,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &str, options: &'a ParseOptions, collector: &'a mut FeedbackCollector) -> Self {
        Tokenizer {
            scanner: Scanner::new(src),
            options,
            collector,
            tokens: Vec::new(),
            pending_symbols: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(c) = self.scanner.peek(0) {
            self.collector
                .set_position(self.scanner.line, self.scanner.column);
            self.step(c);
        }
        if !self.pending_symbols.is_empty() {
            let dangling: String = self.pending_symbols.drain(..).map(|(_, raw)| raw).collect();
            self.collector
                .info("Chord symbol with no following note", dangling);
        }
        self.collector.clear_position();
        self.tokens
    }

    fn emit(&mut self, len: usize, kind: TokenKind) {
        let start = self.scanner.pos;
        let src = self.scanner.slice(start, start + len);
        self.scanner.advance(len);
        self.tokens.push(Token::new(src, kind));
    }

    fn step(&mut self, c: char) {
        let next = self.scanner.peek(1);
        let after = self.scanner.peek(2);

        if c == '%' {
            self.scanner.take_line();
            return;
        }

        if (c.is_ascii_uppercase() || c == 'w') && next == Some(':') && after != Some('|') {
            let line = self.scanner.take_line();
            if let Some(meta) = MetadataToken::from_line(&line) {
                self.tokens
                    .push(Token::new(line.trim_end(), TokenKind::Metadata(meta)));
            }
            return;
        }

        if !c.is_whitespace() && !c.is_alphanumeric() && c != '~' && c != '(' {
            if let Some(lexeme) = BAR_LEXEMES.iter().find(|l| self.scanner.starts_with(l)) {
                self.scanner.advance(lexeme.chars().count());
                self.push_bars(lexeme);
                return;
            }
        }

        match c {
            '(' if next.is_some_and(|n| n.is_ascii_digit()) => self.tuplet(),
            '<' | '>' => {
                let len = (0..)
                    .take_while(|i| matches!(self.scanner.peek(*i), Some('<' | '>')))
                    .count();
                self.emit(len, TokenKind::BrokenRhythmMarker);
            }
            '!' => self.decoration(),
            '(' => self.emit(1, TokenKind::SlurStart),
            ')' => self.emit(1, TokenKind::ParenStop),
            '-' => self.emit(1, TokenKind::Tie),
            '"' => self.chord_symbol(),
            '[' => self.bracket(),
            '.' => self.emit(1, TokenKind::Staccato),
            'u' => self.emit(1, TokenKind::UpBow),
            '{' => self.emit(1, TokenKind::GraceStart),
            '}' => self.emit(1, TokenKind::GraceStop),
            'v' => self.emit(1, TokenKind::DownBow),
            'K' => self.emit(1, TokenKind::Accent),
            'k' => self.emit(1, TokenKind::StrongAccent),
            'M' => self.emit(1, TokenKind::Tenuto),
            c if c.is_alphabetic() || "~^=_".contains(c) => self.note(),
            _ => self.scanner.advance(1),
        }
    }

    fn push_bars(&mut self, lexeme: &str) {
        let parts: Vec<&str> = match split_bar_lexeme(lexeme) {
            Some(parts) => parts.to_vec(),
            None => vec![lexeme],
        };
        for part in parts {
            if let Some(bar) = classify_bar(part) {
                self.tokens.push(Token::new(part, TokenKind::Bar(bar)));
            }
        }
    }

    /// `(3`, or the long form `(3:2:3`.
    fn tuplet(&mut self) {
        let actual = self
            .scanner
            .peek(1)
            .and_then(|c| c.to_digit(10))
            .unwrap_or(0) as u8;
        let mut len = 2;
        let mut explicit = [None, None];
        for slot in explicit.iter_mut() {
            let colon = self.scanner.peek(len);
            let following = self.scanner.peek(len + 1);
            if colon != Some(':') || !following.is_some_and(|f| f.is_ascii_digit() || f == ':') {
                break;
            }
            len += 1;
            let digits: String = (len..)
                .map_while(|i| self.scanner.peek(i).filter(|c| c.is_ascii_digit()))
                .collect();
            len += digits.len();
            *slot = digits.parse::<u8>().ok();
        }
        let [normal, count] = explicit;
        self.emit(
            len,
            TokenKind::Tuplet(TupletToken::new(actual, normal, count)),
        );
    }

    /// `!...!` decorations; only dynamics hairpins (and, when enabled, the
    /// long-form articulations) become tokens.
    fn decoration(&mut self) {
        let Some(close) = self.scanner.find('!', self.options.decoration_lookahead) else {
            self.scanner.advance(1);
            return;
        };
        let start = self.scanner.pos;
        let name = self.scanner.slice(start + 1, start + close);
        let extended = self.options.extended_decorations;

        let kind = match name.as_str() {
            "crescendo(" => Some(TokenKind::CrescendoStart),
            "diminuendo(" => Some(TokenKind::DiminuendoStart),
            "crescendo)" | "diminuendo)" => Some(TokenKind::ParenStop),
            "<(" if extended => Some(TokenKind::CrescendoStart),
            ">(" if extended => Some(TokenKind::DiminuendoStart),
            "<)" | ">)" if extended => Some(TokenKind::ParenStop),
            "staccato" if extended => Some(TokenKind::Staccato),
            "upbow" if extended => Some(TokenKind::UpBow),
            "downbow" if extended => Some(TokenKind::DownBow),
            "accent" | ">" | "emphasis" if extended => Some(TokenKind::Accent),
            "tenuto" if extended => Some(TokenKind::Tenuto),
            _ => None,
        };
        match kind {
            Some(kind) => self.emit(close + 1, kind),
            None => self.scanner.advance(close + 1),
        }
    }

    fn chord_symbol(&mut self) {
        let limit = self.scanner.chars.len() - self.scanner.pos;
        match self.scanner.find('"', limit) {
            Some(close) => {
                let start = self.scanner.pos;
                let text = self.scanner.slice(start + 1, start + close);
                let raw = self.scanner.slice(start, start + close + 1);
                self.scanner.advance(close + 1);
                self.pending_symbols.push((text, raw));
            }
            None => {
                let rest = self.scanner.take_line();
                self.collector.warning("Unterminated chord symbol", rest);
            }
        }
    }

    fn take_pending_symbols(&mut self) -> (Vec<String>, String) {
        self.pending_symbols.drain(..).unzip()
    }

    /// `[K:G]` inline field or `[CEG]2` chord.
    fn bracket(&mut self) {
        let limit = self.scanner.chars.len() - self.scanner.pos;
        let Some(close) = self.scanner.find(']', limit) else {
            self.collector.warning("Unclosed '['", "[");
            self.scanner.advance(1);
            return;
        };
        let start = self.scanner.pos;

        let is_field = self.scanner.peek(1).is_some_and(|c| c.is_ascii_alphabetic())
            && self.scanner.peek(2) == Some(':');
        if is_field {
            let inner = self.scanner.slice(start + 1, start + close);
            match MetadataToken::from_line(&inner) {
                Some(meta) => self.emit(close + 1, TokenKind::Metadata(meta)),
                None => self.scanner.advance(close + 1),
            }
            return;
        }

        let mut len = close + 1;
        while self
            .scanner
            .peek(len)
            .is_some_and(|c| c.is_ascii_digit() || c == '/')
        {
            len += 1;
        }
        let body = self.scanner.slice(start, start + len);
        let (symbols, prefix) = self.take_pending_symbols();
        self.scanner.advance(len);
        self.tokens.push(Token::new(
            format!("{prefix}{body}"),
            TokenKind::Chord(ChordToken::new(body, symbols)),
        ));
    }

    /// Note or rest lexeme: ornaments and accidentals, one pitch letter,
    /// then octave marks and duration.
    fn note(&mut self) {
        let first = self.scanner.peek(0).unwrap_or(' ');
        let mut pitch_letter = (first.is_alphabetic() && !NOT_PITCH.contains(first)).then_some(first);
        let mut len = 1;

        while let Some(ch) = self.scanner.peek(len) {
            if pitch_letter.is_none() {
                if PRE_PITCH.contains(ch) {
                    len += 1;
                    continue;
                }
                if ch.is_alphabetic() && !NOT_PITCH.contains(ch) {
                    pitch_letter = Some(ch);
                    len += 1;
                    continue;
                }
            }
            if matches!(ch, ',' | '\'' | '/') || ch.is_ascii_digit() {
                len += 1;
                continue;
            }
            break;
        }

        let start = self.scanner.pos;
        let body = self.scanner.slice(start, start + len);
        self.scanner.advance(len);

        if let Some(reason) = junk_reason(&body, pitch_letter) {
            self.collector.info(format!("Skipping {reason}"), body);
            return;
        }

        let (symbols, prefix) = self.take_pending_symbols();
        self.tokens.push(Token::new(
            format!("{prefix}{body}"),
            TokenKind::Note(NoteToken::new(body, symbols)),
        ));
    }
}

/// Known-bad note lexemes that are dropped without a token.
fn junk_reason(body: &str, pitch_letter: Option<char>) -> Option<&'static str> {
    let mut chars = body.chars();
    let first = chars.next()?;
    let second = chars.next();

    if matches!(first, 'x' | 'H' | 'Z') {
        return Some("invisible rest or bare decoration");
    }
    if first == '=' && second.is_some_and(|c| c.is_ascii_digit()) {
        return Some("'=' followed by a number");
    }
    match pitch_letter {
        None => Some("ornament without a note"),
        Some(letter) if !matches!(letter, 'a'..='g' | 'A'..='G' | 'z') => {
            Some("lexeme without a pitch letter")
        }
        Some(_) => None,
    }
}
