use crate::models::{Mode, Outcome, ScoreSummary, SingleSummary, Verdict, Winner};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Raw outcome counts for one model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub win: u32,
    pub loss: u32,
    pub tie: u32,
    pub error: u32,
}

impl Tally {
    pub fn total(&self) -> u32 {
        self.win + self.loss + self.tie
    }

    /// Rates over judged games; errors are reported but not counted
    pub fn summary(&self, model_id: &str) -> ScoreSummary {
        let total = self.total();
        let rate = |count: f64| (total > 0).then(|| count / total as f64);

        ScoreSummary {
            model_id: model_id.to_string(),
            win: self.win,
            loss: self.loss,
            tie: self.tie,
            error: self.error,
            win_rate: rate(self.win as f64),
            loss_rate: rate(self.loss as f64),
            tie_rate: rate(self.tie as f64),
            win_rate_adjusted: rate(self.win as f64 + self.tie as f64 / 2.0),
        }
    }

    fn record(&mut self, side: Side) {
        match side {
            Side::Win => self.win += 1,
            Side::Loss => self.loss += 1,
            Side::Tie => self.tie += 1,
            Side::Error => self.error += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Win,
    Loss,
    Tie,
    Error,
}

/// Count wins, losses, ties and errors per model across all opponents
pub fn tally_pairwise(verdicts: &[Verdict], mode: Mode) -> BTreeMap<String, Tally> {
    let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();

    for verdict in verdicts.iter().filter(|v| v.mode == mode) {
        let Some(model_b) = &verdict.model_b else {
            continue;
        };
        let (a, b) = match verdict.outcome {
            Outcome::Winner(Winner::A) => (Side::Win, Side::Loss),
            Outcome::Winner(Winner::B) => (Side::Loss, Side::Win),
            Outcome::Winner(Winner::Tie) => (Side::Tie, Side::Tie),
            Outcome::Error => (Side::Error, Side::Error),
            Outcome::Score(_) => continue,
        };
        tallies.entry(verdict.model_a.clone()).or_default().record(a);
        tallies.entry(model_b.clone()).or_default().record(b);
    }
    tallies
}

/// Summaries for pairwise modes.
///
/// `models` restricts and extends the table: listed models without any
/// verdicts appear as no-data rows. With an empty list every model seen in
/// the verdicts is reported. The baseline, if given, is left out.
pub fn summarize_pairwise(
    verdicts: &[Verdict],
    mode: Mode,
    models: &[String],
    baseline: Option<&str>,
) -> Vec<ScoreSummary> {
    let tallies = tally_pairwise(verdicts, mode);
    let model_ids: Vec<String> = if models.is_empty() {
        tallies.keys().cloned().collect()
    } else {
        models.to_vec()
    };

    let mut summaries: Vec<ScoreSummary> = model_ids
        .iter()
        .filter(|id| Some(id.as_str()) != baseline)
        .map(|id| tallies.get(id).copied().unwrap_or_default().summary(id))
        .collect();
    summaries.sort_by(compare_summaries);
    summaries.dedup_by(|a, b| a.model_id == b.model_id);
    summaries
}

/// Adjusted win rate desc (no-data last), then wins desc, then model id asc
fn compare_summaries(a: &ScoreSummary, b: &ScoreSummary) -> Ordering {
    let rate_a = a.win_rate_adjusted.unwrap_or(f64::NEG_INFINITY);
    let rate_b = b.win_rate_adjusted.unwrap_or(f64::NEG_INFINITY);
    rate_b
        .partial_cmp(&rate_a)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.win.cmp(&a.win))
        .then_with(|| a.model_id.cmp(&b.model_id))
}

/// Mean scores for single mode, highest first
pub fn summarize_single(verdicts: &[Verdict], models: &[String]) -> Vec<SingleSummary> {
    let mut scores: BTreeMap<String, (f64, u32, u32)> = BTreeMap::new();
    for verdict in verdicts.iter().filter(|v| v.mode == Mode::Single) {
        let entry = scores.entry(verdict.model_a.clone()).or_default();
        match verdict.outcome {
            Outcome::Score(score) => {
                entry.0 += score;
                entry.1 += 1;
            }
            Outcome::Error => entry.2 += 1,
            Outcome::Winner(_) => {}
        }
    }

    let model_ids: Vec<String> = if models.is_empty() {
        scores.keys().cloned().collect()
    } else {
        models.to_vec()
    };

    let mut summaries: Vec<SingleSummary> = model_ids
        .iter()
        .map(|id| {
            let (sum, judged, error) = scores.get(id).copied().unwrap_or_default();
            SingleSummary {
                model_id: id.clone(),
                judged,
                error,
                mean_score: (judged > 0).then(|| sum / judged as f64),
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        let mean_a = a.mean_score.unwrap_or(f64::NEG_INFINITY);
        let mean_b = b.mean_score.unwrap_or(f64::NEG_INFINITY);
        mean_b
            .partial_cmp(&mean_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.model_id.cmp(&b.model_id))
    });
    summaries.dedup_by(|a, b| a.model_id == b.model_id);
    summaries
}
