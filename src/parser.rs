//! Verdict extraction from free-text judge output.
//!
//! Judges answer in prose with the verdict token somewhere inside it, often in
//! Japanese and sometimes with full-width characters. Extraction is a ranked
//! list of patterns; the first family that matches at all decides, and an
//! out-of-range value there is an error rather than a cue to keep looking.

use crate::error::JudgeError;
use crate::models::{Mode, Outcome, Winner};
use regex::Regex;

/// Structured extraction of a verdict from judge output
pub trait VerdictParser {
    /// Score for single mode
    fn parse_score(&self, text: &str) -> Result<f64, JudgeError>;

    /// Winner by prompt position for pairwise modes
    fn parse_winner(&self, text: &str) -> Result<Winner, JudgeError>;

    fn parse(&self, mode: Mode, text: &str) -> Result<Outcome, JudgeError> {
        if mode.is_pairwise() {
            self.parse_winner(text).map(Outcome::Winner)
        } else {
            self.parse_score(text).map(Outcome::Score)
        }
    }
}

/// Regex-based parser for `[[rating]]` and `[[A]]`/`[[B]]`/`[[C]]` style output
#[derive(Debug, Clone)]
pub struct PatternParser {
    score_min: u32,
    score_max: u32,
    tie_delta: f64,
    score_patterns: Vec<Regex>,
    number: Regex,
    verdict_marker: Regex,
    /// `[[x, y]]` then the looser `[x, y]`
    two_scores: [Regex; 2],
    textual: Vec<(Regex, Option<Winner>)>,
}

impl PatternParser {
    pub fn new(score_min: u32, score_max: u32, tie_delta: f64) -> Result<Self, regex::Error> {
        let score_patterns = vec![
            Regex::new(r"(?i)\[\[\s*(?:rating\s*:\s*)?(\d+(?:\.\d+)?)\s*\]\]")?,
            Regex::new(r"(?i)\b(?:score|rating)\s*(?:of|is|:|=)?\s*(\d+(?:\.\d+)?)")?,
            Regex::new(r"(?:評価|点数|スコア|得点)\s*(?:は|:)?\s*(\d+(?:\.\d+)?)")?,
            Regex::new(&format!(r"(\d+(?:\.\d+)?)\s*/\s*{}\b", score_max))?,
            Regex::new(r"(\d+(?:\.\d+)?)\s*点")?,
        ];

        let two_scores = [
            Regex::new(r"\[\[\s*(\d+\.?\d*)\s*,\s*(\d+\.?\d*)\s*\]\]")?,
            Regex::new(r"\[\s*(\d+\.?\d*)\s*,\s*(\d+\.?\d*)\s*\]")?,
        ];

        // `None` means the winner is read from capture group 1
        let textual = vec![
            (
                Regex::new(r"(?i:verdict)\s*(?i:is)?\s*:?\s*\[?\s*(?:(?i:assistant)\s+)?(A|B|C|(?i:tie))\b")?,
                None,
            ),
            (
                Regex::new(r"(?i:assistant)\s+(A|B)(?:'s\s+(?i:answer|response))?\s+(?i:is\s+(?:clearly\s+|slightly\s+|much\s+)?(?:better|superior|the\s+winner))")?,
                None,
            ),
            (Regex::new(r"アシスタント\s*(A|B)\s*(?:の(?:方|回答))?(?:が|は)(?:より)?(?:優れ|良い|勝)")?, None),
            (
                Regex::new(r"(?i)\b(?:(?:is|it's)\s+a\s+tie|equally\s+good)\b")?,
                Some(Winner::Tie),
            ),
            (Regex::new(r"引き分け|同等")?, Some(Winner::Tie)),
        ];

        Ok(Self {
            score_min,
            score_max,
            tie_delta,
            score_patterns,
            number: Regex::new(r"\d+(?:\.\d+)?")?,
            verdict_marker: Regex::new(r"\[\[\s*(A|B|C|(?i:tie))\s*\]\]")?,
            two_scores,
            textual,
        })
    }

    fn in_range(&self, value: f64) -> bool {
        value >= self.score_min as f64 && value <= self.score_max as f64
    }

    /// First in-range integer anywhere in the text
    fn first_bare_integer(&self, text: &str) -> Option<f64> {
        self.number
            .find_iter(text)
            .filter(|m| !m.as_str().contains('.'))
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .find(|&value| self.in_range(value))
    }

    fn winner_from_scores(&self, pattern: &Regex, text: &str) -> Option<Winner> {
        let captures = pattern.captures(text)?;
        let a: f64 = captures[1].parse().ok()?;
        let b: f64 = captures[2].parse().ok()?;
        Some(if (a - b).abs() <= self.tie_delta {
            Winner::Tie
        } else if a > b {
            Winner::A
        } else {
            Winner::B
        })
    }

    fn winner_from_prose(&self, text: &str) -> Option<Winner> {
        let mut last: Option<(usize, Winner)> = None;
        for (re, fixed) in &self.textual {
            for captures in re.captures_iter(text) {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                let winner = match fixed {
                    Some(winner) => Some(*winner),
                    None => captures.get(1).and_then(|m| winner_label(m.as_str())),
                };
                if let Some(winner) = winner {
                    if last.is_none_or(|(position, _)| whole.start() >= position) {
                        last = Some((whole.start(), winner));
                    }
                }
            }
        }
        last.map(|(_, winner)| winner)
    }
}

impl VerdictParser for PatternParser {
    fn parse_score(&self, text: &str) -> Result<f64, JudgeError> {
        let text = normalize(text);
        let unparsable = JudgeError::UnparsableScore {
            min: self.score_min,
            max: self.score_max,
        };

        // The first family that matches decides; its last match is the final
        // rating since judges often quote the format example first
        for pattern in &self.score_patterns {
            let last = pattern
                .captures_iter(&text)
                .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<f64>().ok()))
                .last();
            if let Some(score) = last {
                return if self.in_range(score) { Ok(score) } else { Err(unparsable) };
            }
        }

        self.first_bare_integer(&text).ok_or(unparsable)
    }

    fn parse_winner(&self, text: &str) -> Result<Winner, JudgeError> {
        let text = normalize(text);

        // Judges often quote the output format before giving the verdict
        let marker = self
            .verdict_marker
            .captures_iter(&text)
            .filter_map(|c| winner_label(&c[1]))
            .last();
        if let Some(winner) = marker {
            return Ok(winner);
        }

        // A bare `[x, y]` is often a quoted list, so prose is tried before it
        self.winner_from_scores(&self.two_scores[0], &text)
            .or_else(|| self.winner_from_prose(&text))
            .or_else(|| self.winner_from_scores(&self.two_scores[1], &text))
            .ok_or(JudgeError::UnparsableVerdict)
    }
}

fn winner_label(label: &str) -> Option<Winner> {
    match label {
        "A" => Some(Winner::A),
        "B" => Some(Winner::B),
        "C" => Some(Winner::Tie),
        other if other.eq_ignore_ascii_case("tie") => Some(Winner::Tie),
        _ => None,
    }
}

/// Fold full-width ASCII variants and the ideographic space to ASCII
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}
