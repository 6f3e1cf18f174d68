use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A benchmark question with one or more user turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: u32,
    pub category: String,
    pub turns: Vec<String>,
}

/// One model's answer to one turn of a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Defaults to the answer file's stem when absent on disk
    #[serde(default)]
    pub model_id: String,
    pub question_id: u32,
    /// Zero-based index into `Question::turns`
    pub turn_index: usize,
    pub text: String,
}

/// Judgment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Score one model's answer in isolation
    Single,
    /// Compare every model against one fixed baseline model
    PairwiseBaseline,
    /// Compare every pair of models
    PairwiseAll,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Single => "single",
            Mode::PairwiseBaseline => "pairwise-baseline",
            Mode::PairwiseAll => "pairwise-all",
        }
    }

    pub fn is_pairwise(&self) -> bool {
        !matches!(self, Mode::Single)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Winner of a pairwise game.
///
/// Inside a single game `A`/`B` are prompt positions; on a stored verdict
/// they refer to `model_a`/`model_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    A,
    B,
    #[serde(rename = "tie")]
    Tie,
}

impl Winner {
    /// The same result seen from the other side of the table
    pub fn swapped(self) -> Self {
        match self {
            Winner::A => Winner::B,
            Winner::B => Winner::A,
            Winner::Tie => Winner::Tie,
        }
    }
}

/// Structured result of one judgment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Score(f64),
    Winner(Winner),
    Error,
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error)
    }
}

/// Transient request sent to the judge
#[derive(Debug, Clone, PartialEq)]
pub struct JudgmentRequest {
    pub mode: Mode,
    pub question_id: u32,
    pub turn_index: usize,
    pub model_a: String,
    pub model_b: Option<String>,
    pub system_prompt: String,
    pub rendered_prompt: String,
}

/// Uniqueness key of a verdict within a judgment file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerdictKey {
    pub mode: Mode,
    pub question_id: u32,
    pub turn_index: usize,
    pub model_a: String,
    pub model_b: Option<String>,
}

impl fmt::Display for VerdictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, q{}, turn {}, {}",
            self.mode, self.question_id, self.turn_index, self.model_a
        )?;
        if let Some(model_b) = &self.model_b {
            write!(f, " vs {}", model_b)?;
        }
        f.write_str(")")
    }
}

/// A persisted judgment, one JSON line in a judgment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub mode: Mode,
    pub question_id: u32,
    pub turn_index: usize,
    pub model_a: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_b: Option<String>,
    pub judge_model: String,
    /// Judge output for the (A = model_a, B = model_b) ordering
    pub raw_judge_text: String,
    /// Judge output for the swapped ordering, pairwise modes only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swapped_judge_text: Option<String>,
    /// Rendered user prompts, kept so a judgment can be audited or replayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swapped_user_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_winner: Option<Winner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_winner: Option<Winner>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub tstamp: u64,
}

impl Verdict {
    pub fn key(&self) -> VerdictKey {
        VerdictKey {
            mode: self.mode,
            question_id: self.question_id,
            turn_index: self.turn_index,
            model_a: self.model_a.clone(),
            model_b: self.model_b.clone(),
        }
    }
}

/// Win/loss/tie summary for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub model_id: String,
    pub win: u32,
    pub loss: u32,
    pub tie: u32,
    /// Error outcomes, not part of the rate denominators
    pub error: u32,
    /// `None` when the model has no judged games
    pub win_rate: Option<f64>,
    pub loss_rate: Option<f64>,
    pub tie_rate: Option<f64>,
    pub win_rate_adjusted: Option<f64>,
}

/// Mean-score summary for one model in single mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleSummary {
    pub model_id: String,
    pub judged: u32,
    pub error: u32,
    pub mean_score: Option<f64>,
}
