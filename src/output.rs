use crate::models::{Mode, ScoreSummary, SingleSummary};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

const NO_DATA: &str = "no-data";

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print pairwise results in the specified format
pub fn print_pairwise(mode: Mode, summaries: &[ScoreSummary], format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_pairwise_plain(mode, summaries)),
        OutputFormat::Json => print_json(summaries),
    }
}

/// Print single-mode results in the specified format
pub fn print_single(summaries: &[SingleSummary], format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_single_plain(summaries)),
        OutputFormat::Json => print_json(summaries),
    }
}

fn rate(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => NO_DATA.to_string(),
    }
}

/// Render pairwise summaries as a fixed-width table
pub fn render_pairwise_plain(mode: Mode, summaries: &[ScoreSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Mode: {}", mode);

    if summaries.is_empty() {
        let _ = writeln!(out, "No judgments available.");
        return out;
    }

    let width = summaries
        .iter()
        .map(|s| s.model_id.chars().count())
        .max()
        .unwrap_or(0)
        .max("model".len());

    let _ = writeln!(
        out,
        "{:<width$}  {:>5} {:>5} {:>5} {:>5}  {:>8} {:>9} {:>8} {:>17}",
        "model", "win", "loss", "tie", "error", "win_rate", "loss_rate", "tie_rate", "win_rate_adjusted",
    );
    let _ = writeln!(out, "{}", "-".repeat(width + 72));

    for s in summaries {
        let _ = writeln!(
            out,
            "{:<width$}  {:>5} {:>5} {:>5} {:>5}  {:>8} {:>9} {:>8} {:>17}",
            s.model_id,
            s.win,
            s.loss,
            s.tie,
            s.error,
            rate(s.win_rate),
            rate(s.loss_rate),
            rate(s.tie_rate),
            rate(s.win_rate_adjusted),
        );
    }
    out
}

/// Render single-mode summaries as a fixed-width table
pub fn render_single_plain(summaries: &[SingleSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Mode: {}", Mode::Single);

    if summaries.is_empty() {
        let _ = writeln!(out, "No judgments available.");
        return out;
    }

    let width = summaries
        .iter()
        .map(|s| s.model_id.chars().count())
        .max()
        .unwrap_or(0)
        .max("model".len());

    let _ = writeln!(out, "{:<width$}  {:>6} {:>5} {:>10}", "model", "judged", "error", "mean_score");
    let _ = writeln!(out, "{}", "-".repeat(width + 25));
    for s in summaries {
        let mean = match s.mean_score {
            Some(v) => format!("{:.2}", v),
            None => NO_DATA.to_string(),
        };
        let _ = writeln!(out, "{:<width$}  {:>6} {:>5} {:>10}", s.model_id, s.judged, s.error, mean);
    }
    out
}

/// Print results in JSON format
fn print_json<T: Serialize + ?Sized>(results: &T) {
    match serde_json::to_string_pretty(results) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Tally;

    fn summaries() -> Vec<ScoreSummary> {
        vec![
            Tally { win: 87, loss: 25, tie: 52, error: 1 }.summary("rinna-ppo"),
            Tally::default().summary("unjudged"),
        ]
    }

    #[test]
    fn test_pairwise_plain_table() {
        let table = render_pairwise_plain(Mode::PairwiseBaseline, &summaries());
        assert!(table.starts_with("Mode: pairwise-baseline"));
        assert!(table.contains("win_rate_adjusted"));
        assert!(table.contains("rinna-ppo"));
        assert!(table.contains("0.689"));
        let unjudged = table.lines().find(|l| l.starts_with("unjudged")).unwrap();
        assert!(unjudged.contains(NO_DATA));
    }

    #[test]
    fn test_pairwise_plain_empty() {
        let table = render_pairwise_plain(Mode::PairwiseAll, &[]);
        assert!(table.contains("No judgments available."));
    }

    #[test]
    fn test_single_plain_table() {
        let rows = vec![
            SingleSummary { model_id: "ppo".to_string(), judged: 80, error: 0, mean_score: Some(6.25) },
            SingleSummary { model_id: "empty".to_string(), judged: 0, error: 2, mean_score: None },
        ];
        let table = render_single_plain(&rows);
        assert!(table.contains("6.25"));
        assert!(table.lines().any(|l| l.starts_with("empty") && l.contains(NO_DATA)));
    }

    #[test]
    fn test_json_output() {
        let json = serde_json::to_value(summaries()).unwrap();
        assert_eq!(json[0]["model_id"], "rinna-ppo");
        assert!(json[1]["win_rate"].is_null());
        // ensures printing does not panic
        print_pairwise(Mode::PairwiseBaseline, &summaries(), OutputFormat::Json);
    }
}
