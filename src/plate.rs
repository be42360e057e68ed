//! Plate text normalization and grammar validation.
//!
//! Two grammars are recognised, tested in this order:
//!
//! - traditional: `LLLNNNN` (three letters, four digits)
//! - Mercosul:    `LLLNLNN` (three letters, digit, letter, two digits)
//!
//! The fifth character is a digit in one and a letter in the other, so no
//! string can match both.
//!
//! OCR output is cleaned up before classification: non-alphanumerics are
//! stripped, the text is uppercased, and confident reads (confidence at or
//! above `CORRECTION_THRESHOLD`) get their visually confusable characters
//! rewritten. Below the threshold the text is classified as read.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum OCR confidence for confusable-character correction.
pub const CORRECTION_THRESHOLD: f32 = 0.80;

/// Letters commonly misread where a digit belongs.
const DIGIT_TABLE: [(char, char); 8] = [
    ('B', '8'),
    ('G', '6'),
    ('I', '1'),
    ('O', '0'),
    ('S', '5'),
    ('Z', '2'),
    ('A', '4'),
    ('D', '0'),
];

/// Digits commonly misread where a letter belongs.
const LETTER_TABLE: [(char, char); 7] = [
    ('8', 'B'),
    ('6', 'G'),
    ('1', 'I'),
    ('0', 'O'),
    ('5', 'S'),
    ('2', 'Z'),
    ('4', 'A'),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateKind {
    Traditional,
    Mercosul,
}

impl PlateKind {
    /// Classification order.
    pub const ALL: [PlateKind; 2] = [PlateKind::Traditional, PlateKind::Mercosul];

    pub fn as_str(self) -> &'static str {
        match self {
            PlateKind::Traditional => "traditional",
            PlateKind::Mercosul => "mercosul",
        }
    }

    /// Whether position `index` of a plate of this kind holds a letter.
    fn letter_at(self, index: usize) -> bool {
        match self {
            PlateKind::Traditional => index < 3,
            PlateKind::Mercosul => index < 3 || index == 4,
        }
    }

    fn pattern(self) -> &'static Regex {
        static TRADITIONAL_RE: OnceLock<Regex> = OnceLock::new();
        static MERCOSUL_RE: OnceLock<Regex> = OnceLock::new();
        match self {
            PlateKind::Traditional => TRADITIONAL_RE
                .get_or_init(|| Regex::new(r"^[A-Z]{3}[0-9]{4}$").expect("traditional regex")),
            PlateKind::Mercosul => MERCOSUL_RE.get_or_init(|| {
                Regex::new(r"^[A-Z]{3}[0-9][A-Z][0-9]{2}$").expect("mercosul regex")
            }),
        }
    }

    pub fn matches(self, text: &str) -> bool {
        self.pattern().is_match(text)
    }
}

impl fmt::Display for PlateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlateKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "traditional" => Ok(PlateKind::Traditional),
            "mercosul" => Ok(PlateKind::Mercosul),
            other => Err(anyhow!("unknown plate kind '{}'", other)),
        }
    }
}

/// How confusable characters are rewritten once the confidence gate passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionMode {
    /// Text that already fits a grammar is kept. Otherwise, per grammar in
    /// classification order, digit slots go through the digit table and then
    /// letter slots through the letter table; the first grammar whose result
    /// matches wins.
    #[default]
    Positional,
    /// Digit table over every character, then letter table over every
    /// character of the result. This is how the legacy recognition service
    /// corrected reads; select it to reproduce that service's plate texts.
    Sequential,
}

impl FromStr for CorrectionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(CorrectionMode::Positional),
            "sequential" => Ok(CorrectionMode::Sequential),
            other => Err(anyhow!(
                "unknown correction mode '{}'; expected positional or sequential",
                other
            )),
        }
    }
}

/// A validated plate. Only `PlateValidator` builds these.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPlate {
    text: String,
    kind: PlateKind,
    confidence: f32,
}

impl NormalizedPlate {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> PlateKind {
        self.kind
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

/// Deterministic text → plate pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlateValidator {
    mode: CorrectionMode,
}

impl PlateValidator {
    pub fn new(mode: CorrectionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CorrectionMode {
        self.mode
    }

    /// Strip, correct (when confident) and classify one OCR guess.
    pub fn validate(&self, raw: &str, confidence: f32) -> Option<NormalizedPlate> {
        let stripped = strip(raw);
        let text = self.correct(&stripped, confidence);
        let kind = classify(&text)?;
        Some(NormalizedPlate {
            text,
            kind,
            confidence,
        })
    }

    /// Confusable-character correction. A no-op below the threshold.
    pub fn correct(&self, text: &str, confidence: f32) -> String {
        if confidence < CORRECTION_THRESHOLD {
            return text.to_string();
        }
        match self.mode {
            CorrectionMode::Sequential => {
                let digits: String = text.chars().map(to_digit).collect();
                digits.chars().map(to_letter).collect()
            }
            CorrectionMode::Positional => correct_positional(text),
        }
    }
}

fn correct_positional(text: &str) -> String {
    if classify(text).is_some() {
        return text.to_string();
    }
    for kind in PlateKind::ALL {
        let digits: String = text
            .chars()
            .enumerate()
            .map(|(i, c)| if kind.letter_at(i) { c } else { to_digit(c) })
            .collect();
        let candidate: String = digits
            .chars()
            .enumerate()
            .map(|(i, c)| if kind.letter_at(i) { to_letter(c) } else { c })
            .collect();
        if kind.matches(&candidate) {
            return candidate;
        }
    }
    text.to_string()
}

/// Drop everything but ASCII letters/digits and uppercase the rest.
pub fn strip(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Match `text` against the grammars in order.
pub fn classify(text: &str) -> Option<PlateKind> {
    PlateKind::ALL.into_iter().find(|kind| kind.matches(text))
}

fn to_digit(c: char) -> char {
    lookup(&DIGIT_TABLE, c)
}

fn to_letter(c: char) -> char {
    lookup(&LETTER_TABLE, c)
}

fn lookup(table: &[(char, char)], c: char) -> char {
    table
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_examples() {
        assert_eq!(classify("ABC1234"), Some(PlateKind::Traditional));
        assert_eq!(classify("ABC1D23"), Some(PlateKind::Mercosul));
        assert_eq!(classify("AB1234"), None);
        assert_eq!(classify("ABC12345"), None);
        assert_eq!(classify("abc1234"), None);
    }

    #[test]
    fn accepted_text_matches_exactly_one_grammar() {
        let validator = PlateValidator::default();
        let inputs = [
            ("ABC-1234", 0.95),
            ("abc 1d23", 0.4),
            ("8BC1Z34", 0.9),
            ("QRS5T67", 0.81),
            ("X1Y2Z3", 0.99),
            ("OOO0000", 0.85),
            ("BRA2E19", 0.3),
        ];
        for (raw, conf) in inputs {
            if let Some(plate) = validator.validate(raw, conf) {
                let hits = PlateKind::ALL
                    .iter()
                    .filter(|kind| kind.matches(plate.text()))
                    .count();
                assert_eq!(hits, 1, "{} matched {} grammars", plate.text(), hits);
                assert!(plate.kind().matches(plate.text()));
            }
        }
    }

    #[test]
    fn strip_removes_punctuation_and_uppercases() {
        assert_eq!(strip(" abc-1d23 \n"), "ABC1D23");
        assert_eq!(strip("ÀBC·1234"), "BC1234");
    }

    #[test]
    fn confident_read_is_corrected() {
        let plate = PlateValidator::default().validate("8BC1Z34", 0.9).unwrap();
        assert_eq!(plate.text(), "BBC1234");
        assert_eq!(plate.kind(), PlateKind::Traditional);
        assert_eq!(plate.confidence(), 0.9);
    }

    #[test]
    fn low_confidence_read_is_classified_as_read() {
        let validator = PlateValidator::default();
        assert_eq!(validator.correct("8BC1Z34", 0.5), "8BC1Z34");
        assert!(validator.validate("8BC1Z34", 0.5).is_none());
        assert_eq!(
            validator.validate("abc-1234", 0.5).unwrap().kind(),
            PlateKind::Traditional
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let validator = PlateValidator::default();
        assert_eq!(validator.correct("8BC1Z34", 0.80), "BBC1234");
        assert_eq!(validator.correct("8BC1Z34", 0.79), "8BC1Z34");
    }

    #[test]
    fn valid_plates_survive_correction_unchanged() {
        let validator = PlateValidator::default();
        for text in ["ABC1234", "ABC1D23", "XYZ5678", "BRA2E19"] {
            assert_eq!(validator.correct(text, 0.99), text);
        }
    }

    #[test]
    fn correction_is_idempotent() {
        let validator = PlateValidator::default();
        for raw in ["8BC1Z34", "0AB12C3", "5GZI234", "ABCDEFG"] {
            let once = validator.correct(raw, 0.9);
            assert_eq!(validator.correct(&once, 0.9), once, "input {}", raw);
        }
    }

    #[test]
    fn mercosul_slots_are_corrected() {
        let plate = PlateValidator::default().validate("A8C1B2S", 0.9);
        // traditional slots: A B C 1 8 2 5 -> "ABC1825"
        assert_eq!(plate.unwrap().text(), "ABC1825");

        let plate = PlateValidator::default().validate("4BC1DZ3", 0.9).unwrap();
        // traditional: ABC1023 matches first
        assert_eq!(plate.text(), "ABC1023");
        assert_eq!(plate.kind(), PlateKind::Traditional);

        let plate = PlateValidator::default().validate("ABCI8Z3", 0.9).unwrap();
        // traditional needs I8Z3 -> 1823: "ABC1823"
        assert_eq!(plate.text(), "ABC1823");
    }

    #[test]
    fn mercosul_only_candidate() {
        // fifth character 'X' is no digit lookalike, so only Mercosul fits
        let plate = PlateValidator::default().validate("ABCIXZ3", 0.9).unwrap();
        assert_eq!(plate.text(), "ABC1X23");
        assert_eq!(plate.kind(), PlateKind::Mercosul);
    }

    #[test]
    fn sequential_mode_applies_both_tables_to_every_character() {
        let validator = PlateValidator::new(CorrectionMode::Sequential);
        // B->8 and Z->2, then every lookalike digit back to a letter
        assert_eq!(validator.correct("8BC1Z34", 0.9), "BBCIZ3A");
        assert!(validator.validate("8BC1Z34", 0.9).is_none());
        // digits without a letter lookalike survive
        assert_eq!(validator.correct("HJK7393", 0.9), "HJK7393");
        assert_eq!(
            validator.validate("HJK7393", 0.9).unwrap().kind(),
            PlateKind::Traditional
        );
    }

    #[test]
    fn sequential_mode_respects_threshold() {
        let validator = PlateValidator::new(CorrectionMode::Sequential);
        assert_eq!(validator.correct("ABC1234", 0.5), "ABC1234");
    }

    #[test]
    fn parses_names() {
        assert_eq!("mercosul".parse::<PlateKind>().unwrap(), PlateKind::Mercosul);
        assert!("none".parse::<PlateKind>().is_err());
        assert_eq!(
            " Sequential ".parse::<CorrectionMode>().unwrap(),
            CorrectionMode::Sequential
        );
        assert!("fuzzy".parse::<CorrectionMode>().is_err());
    }
}
