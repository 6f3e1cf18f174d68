use crate::client::{ChatBackend, ChatMessage};
use crate::error::JudgeError;
use crate::models::{JudgmentRequest, Mode, Outcome, Verdict, VerdictKey, Winner};
use crate::parser::VerdictParser;
use crate::prompt::PromptBuilder;
use crate::questions::QuestionSet;
use crate::store::JsonLinesWriter;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// One judgment to perform
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub question_id: u32,
    pub turn_index: usize,
    pub model_a: String,
    pub model_b: Option<String>,
}

impl Match {
    fn key(&self, mode: Mode) -> VerdictKey {
        VerdictKey {
            mode,
            question_id: self.question_id,
            turn_index: self.turn_index,
            model_a: self.model_a.clone(),
            model_b: self.model_b.clone(),
        }
    }
}

/// Rendered prompts for a match; pairwise matches carry the swapped ordering too
#[derive(Debug, Clone)]
struct PreparedMatch {
    request: JudgmentRequest,
    swapped: Option<JudgmentRequest>,
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub judged: usize,
    pub errors: usize,
    /// Matches dropped because a prompt could not be built
    pub skipped: usize,
    /// Matches already present in the judgment file
    pub resumed: usize,
}

/// Enumerate the matches a mode requires.
///
/// Pairwise-all pairs are ordered so that `model_a < model_b`.
pub fn build_matches(
    mode: Mode,
    questions: &QuestionSet,
    models: &[String],
    baseline: Option<&str>,
) -> Result<Vec<Match>> {
    let mut models: Vec<String> = models.to_vec();
    models.sort();
    models.dedup();

    let mut matches = Vec::new();
    for question in questions.iter() {
        for turn_index in 0..question.turns.len() {
            match mode {
                Mode::Single => {
                    for model in &models {
                        matches.push(Match {
                            question_id: question.question_id,
                            turn_index,
                            model_a: model.clone(),
                            model_b: None,
                        });
                    }
                }
                Mode::PairwiseBaseline => {
                    let Some(baseline) = baseline else {
                        anyhow::bail!("pairwise-baseline mode requires a baseline model");
                    };
                    for model in models.iter().filter(|m| m.as_str() != baseline) {
                        matches.push(Match {
                            question_id: question.question_id,
                            turn_index,
                            model_a: model.clone(),
                            model_b: Some(baseline.to_string()),
                        });
                    }
                }
                Mode::PairwiseAll => {
                    for (i, model_a) in models.iter().enumerate() {
                        for model_b in &models[i + 1..] {
                            matches.push(Match {
                                question_id: question.question_id,
                                turn_index,
                                model_a: model_a.clone(),
                                model_b: Some(model_b.clone()),
                            });
                        }
                    }
                }
            }
        }
    }
    Ok(matches)
}

/// Combine the two orderings of a pairwise match.
///
/// Both winners are already expressed relative to `model_a`/`model_b`.
/// Agreement stands, any error makes the match an error, and any other
/// disagreement is a tie.
pub fn reconcile(
    first: Result<Winner, JudgeError>,
    second: Result<Winner, JudgeError>,
) -> Result<Winner, JudgeError> {
    match (first, second) {
        (Err(e), _) | (_, Err(e)) => Err(e),
        (Ok(a), Ok(b)) if a == b => Ok(a),
        (Ok(_), Ok(_)) => Ok(Winner::Tie),
    }
}

/// Drives prompts through the judge and records verdicts
pub struct Runner<C, P> {
    client: C,
    parser: P,
    parallel: usize,
}

impl<C: ChatBackend, P: VerdictParser> Runner<C, P> {
    pub fn new(client: C, parser: P, parallel: usize) -> Self {
        Self {
            client,
            parser,
            parallel: parallel.max(1),
        }
    }

    /// Judge every match not listed in `already_judged`, appending verdicts to `writer`.
    ///
    /// Only a write failure aborts the run.
    pub async fn run(
        &self,
        mode: Mode,
        matches: &[Match],
        questions: &QuestionSet,
        builder: &PromptBuilder<'_>,
        already_judged: &BTreeSet<VerdictKey>,
        writer: &mut JsonLinesWriter,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut prepared = Vec::new();

        for m in matches {
            if already_judged.contains(&m.key(mode)) {
                report.resumed += 1;
                continue;
            }
            match self.prepare(mode, m, questions, builder) {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    tracing::warn!(
                        question_id = m.question_id,
                        turn_index = m.turn_index,
                        model_a = %m.model_a,
                        model_b = ?m.model_b,
                        error = %e,
                        "skipping judgment"
                    );
                    report.skipped += 1;
                }
            }
        }

        let total = prepared.len();
        tracing::info!(
            mode = %mode,
            total,
            resumed = report.resumed,
            skipped = report.skipped,
            "starting judgments"
        );

        let mut verdicts = stream::iter(prepared)
            .map(|p| self.judge(p))
            .buffer_unordered(self.parallel);

        while let Some(verdict) = verdicts.next().await {
            writer.append(&verdict)?;
            report.judged += 1;
            if verdict.outcome.is_error() {
                report.errors += 1;
            }
            tracing::info!(
                judged = report.judged,
                total,
                question_id = verdict.question_id,
                turn_index = verdict.turn_index,
                model_a = %verdict.model_a,
                model_b = ?verdict.model_b,
                outcome = ?verdict.outcome,
                "judged"
            );
        }

        Ok(report)
    }

    fn prepare(
        &self,
        mode: Mode,
        m: &Match,
        questions: &QuestionSet,
        builder: &PromptBuilder<'_>,
    ) -> Result<PreparedMatch, JudgeError> {
        let question = questions.get(m.question_id).ok_or(JudgeError::MissingTurn {
            question_id: m.question_id,
            turn_index: m.turn_index,
        })?;

        match &m.model_b {
            None => Ok(PreparedMatch {
                request: builder.single(question, &m.model_a, m.turn_index)?,
                swapped: None,
            }),
            Some(model_b) => Ok(PreparedMatch {
                request: builder.pairwise(mode, question, &m.model_a, model_b, m.turn_index)?,
                swapped: Some(builder.pairwise(mode, question, model_b, &m.model_a, m.turn_index)?),
            }),
        }
    }

    async fn ask(&self, request: &JudgmentRequest) -> Result<String, JudgeError> {
        self.client
            .complete(&[
                ChatMessage::system(request.system_prompt.clone()),
                ChatMessage::user(request.rendered_prompt.clone()),
            ])
            .await
    }

    async fn judge(&self, prepared: PreparedMatch) -> Verdict {
        let PreparedMatch { request, swapped } = prepared;
        let mut verdict = Verdict {
            mode: request.mode,
            question_id: request.question_id,
            turn_index: request.turn_index,
            model_a: request.model_a.clone(),
            model_b: request.model_b.clone(),
            judge_model: self.client.model_name().to_string(),
            raw_judge_text: String::new(),
            swapped_judge_text: None,
            user_prompt: Some(request.rendered_prompt.clone()),
            swapped_user_prompt: swapped.as_ref().map(|s| s.rendered_prompt.clone()),
            first_winner: None,
            second_winner: None,
            outcome: Outcome::Error,
            error: None,
            tstamp: unix_now(),
        };

        let first = self.ask(&request).await;
        let Some(swapped) = swapped else {
            let result = first.and_then(|text| {
                let outcome = self.parser.parse(request.mode, &text);
                verdict.raw_judge_text = text;
                outcome
            });
            match result {
                Ok(outcome) => verdict.outcome = outcome,
                Err(e) => verdict.error = Some(e.to_string()),
            }
            return verdict;
        };

        let second = self.ask(&swapped).await;

        let first_winner = first.and_then(|text| {
            let winner = self.parser.parse_winner(&text);
            verdict.raw_judge_text = text;
            winner
        });
        // In the swapped game position A holds model_b
        let second_winner = second.and_then(|text| {
            let winner = self.parser.parse_winner(&text).map(Winner::swapped);
            verdict.swapped_judge_text = Some(text);
            winner
        });

        verdict.first_winner = first_winner.as_ref().ok().copied();
        verdict.second_winner = second_winner.as_ref().ok().copied();

        match reconcile(first_winner, second_winner) {
            Ok(winner) => verdict.outcome = Outcome::Winner(winner),
            Err(e) => verdict.error = Some(e.to_string()),
        }
        verdict
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
