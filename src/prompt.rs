//! Judge prompt rendering.
//!
//! A judgment of turn `t` shows the judge every question turn up to and
//! including `t` together with the matching answers. Turn 0 uses a compact
//! question/answer layout, later turns use a conversation transcript.

use crate::error::JudgeError;
use crate::models::{JudgmentRequest, Mode, Question};
use crate::store::AnswerStore;
use std::fmt::Write;

const SINGLE_BASE: &str = "Please act as an impartial judge and evaluate the quality of the response provided by an AI assistant to the user question displayed below. The user's question is written in Japanese and the response is expected to be in natural, fluent Japanese; an answer in another language should be rated low. Your evaluation should consider factors such as the helpfulness, relevance, accuracy, depth, creativity, and level of detail of the response.";

const PAIRWISE_BASE: &str = "Please act as an impartial judge and evaluate the quality of the responses provided by two AI assistants to the user question displayed below. The user's question is written in Japanese and the responses are expected to be in natural, fluent Japanese; an answer in another language should be judged worse. You should choose the assistant that follows the user's instructions and answers the user's question better. Your evaluation should consider factors such as the helpfulness, relevance, accuracy, depth, creativity, and level of detail of their responses. Avoid any position biases and ensure that the order in which the responses were presented does not influence your decision. Do not allow the length of the responses to influence your evaluation. Do not favor certain names of the assistants. Be as objective as possible.";

const REFERENCE_GUIDANCE: &str = "You will be given a reference answer. Begin your evaluation by comparing the response with the reference answer. Identify and correct any mistakes.";

const MULTI_TURN_FOCUS: &str = "Your evaluation should focus on the assistant's answer to the last user question.";


const PAIRWISE_FORMAT: &str = "Begin your evaluation by comparing the two responses and provide a short explanation. After providing your explanation, output your final verdict by strictly following this format: \"[[A]]\" if assistant A is better, \"[[B]]\" if assistant B is better, and \"[[C]]\" for a tie.";

/// Renders judge prompts from questions and stored answers
pub struct PromptBuilder<'a> {
    answers: &'a AnswerStore,
    references: Option<(&'a AnswerStore, String)>,
    reference_categories: Vec<String>,
    single_system: Option<String>,
    pairwise_system: Option<String>,
    score_min: u32,
    score_max: u32,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(answers: &'a AnswerStore) -> Self {
        Self {
            answers,
            references: None,
            reference_categories: Vec::new(),
            single_system: None,
            pairwise_system: None,
            score_min: 1,
            score_max: 10,
        }
    }

    /// Rating scale requested in single mode
    pub fn with_score_range(mut self, score_min: u32, score_max: u32) -> Self {
        self.score_min = score_min;
        self.score_max = score_max;
        self
    }

    /// Grade questions in `categories` against answers of `model_id` in `store`
    pub fn with_references(
        mut self,
        store: &'a AnswerStore,
        model_id: impl Into<String>,
        categories: &[String],
    ) -> Self {
        self.references = Some((store, model_id.into()));
        self.reference_categories = categories.to_vec();
        self
    }

    /// Replace the built-in system prompts
    pub fn with_system_prompts(
        mut self,
        single: Option<String>,
        pairwise: Option<String>,
    ) -> Self {
        self.single_system = single;
        self.pairwise_system = pairwise;
        self
    }

    /// Prompt asking for a score of one model's answer
    pub fn single(
        &self,
        question: &Question,
        model: &str,
        turn_index: usize,
    ) -> Result<JudgmentRequest, JudgeError> {
        check_turn(question, turn_index)?;
        let answers = self.collect_answers(model, question.question_id, turn_index)?;
        let reference = self.collect_reference(question, turn_index)?;

        let mut prompt = String::new();
        if turn_index == 0 {
            let _ = write!(prompt, "[Question]\n{}\n\n", question.turns[0]);
            if let Some(reference) = &reference {
                let _ = write!(
                    prompt,
                    "[The Start of Reference Answer]\n{}\n[The End of Reference Answer]\n\n",
                    reference[0]
                );
            }
            let _ = write!(
                prompt,
                "[The Start of Assistant's Answer]\n{}\n[The End of Assistant's Answer]",
                answers[0]
            );
        } else {
            if let Some(reference) = &reference {
                push_transcript(&mut prompt, "Reference Answer", "Reference answer", question, reference);
                prompt.push_str("\n\n");
            }
            push_transcript(
                &mut prompt,
                "Assistant's Conversation with User",
                "Assistant",
                question,
                &answers,
            );
        }

        let system_prompt = match &self.single_system {
            Some(system) => system.clone(),
            None => compose_system(
                SINGLE_BASE,
                reference.is_some(),
                turn_index > 0,
                &single_format(self.score_min, self.score_max),
            ),
        };

        Ok(JudgmentRequest {
            mode: Mode::Single,
            question_id: question.question_id,
            turn_index,
            model_a: model.to_string(),
            model_b: None,
            system_prompt,
            rendered_prompt: prompt,
        })
    }

    /// Prompt asking the judge to pick between `model_a` (shown as A) and `model_b` (shown as B)
    pub fn pairwise(
        &self,
        mode: Mode,
        question: &Question,
        model_a: &str,
        model_b: &str,
        turn_index: usize,
    ) -> Result<JudgmentRequest, JudgeError> {
        check_turn(question, turn_index)?;
        let answers_a = self.collect_answers(model_a, question.question_id, turn_index)?;
        let answers_b = self.collect_answers(model_b, question.question_id, turn_index)?;
        let reference = self.collect_reference(question, turn_index)?;

        let mut prompt = String::new();
        if turn_index == 0 {
            let _ = write!(prompt, "[User Question]\n{}\n\n", question.turns[0]);
            if let Some(reference) = &reference {
                let _ = write!(
                    prompt,
                    "[The Start of Reference Answer]\n{}\n[The End of Reference Answer]\n\n",
                    reference[0]
                );
            }
            let _ = write!(
                prompt,
                "[The Start of Assistant A's Answer]\n{}\n[The End of Assistant A's Answer]\n\n\
                 [The Start of Assistant B's Answer]\n{}\n[The End of Assistant B's Answer]",
                answers_a[0], answers_b[0]
            );
        } else {
            if let Some(reference) = &reference {
                push_transcript(&mut prompt, "Reference Answer", "Reference answer", question, reference);
                prompt.push_str("\n\n");
            }
            push_transcript(
                &mut prompt,
                "Assistant A's Conversation with User",
                "Assistant A",
                question,
                &answers_a,
            );
            prompt.push_str("\n\n");
            push_transcript(
                &mut prompt,
                "Assistant B's Conversation with User",
                "Assistant B",
                question,
                &answers_b,
            );
        }

        let system_prompt = match &self.pairwise_system {
            Some(system) => system.clone(),
            None => compose_system(PAIRWISE_BASE, reference.is_some(), turn_index > 0, PAIRWISE_FORMAT),
        };

        Ok(JudgmentRequest {
            mode,
            question_id: question.question_id,
            turn_index,
            model_a: model_a.to_string(),
            model_b: Some(model_b.to_string()),
            system_prompt,
            rendered_prompt: prompt,
        })
    }

    fn collect_answers(
        &self,
        model: &str,
        question_id: u32,
        turn_index: usize,
    ) -> Result<Vec<&'a str>, JudgeError> {
        (0..=turn_index)
            .map(|t| self.answers.require(model, question_id, t))
            .collect()
    }

    fn collect_reference(
        &self,
        question: &Question,
        turn_index: usize,
    ) -> Result<Option<Vec<&'a str>>, JudgeError> {
        let Some((store, model_id)) = &self.references else {
            return Ok(None);
        };
        if !self.reference_categories.contains(&question.category) {
            return Ok(None);
        }
        let reference = (0..=turn_index)
            .map(|t| store.require(model_id, question.question_id, t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(reference))
    }
}

fn check_turn(question: &Question, turn_index: usize) -> Result<(), JudgeError> {
    if turn_index >= question.turns.len() {
        return Err(JudgeError::MissingTurn {
            question_id: question.question_id,
            turn_index,
        });
    }
    Ok(())
}

fn single_format(score_min: u32, score_max: u32) -> String {
    format!(
        "Begin your evaluation by providing a short explanation. Be as objective as possible. After providing your explanation, you must rate the response on a scale of {score_min} to {score_max} by strictly following this format: \"[[rating]]\", for example: \"Rating: [[{}]]\".",
        (score_min + score_max) / 2
    )
}

fn compose_system(base: &str, with_reference: bool, multi_turn: bool, format: &str) -> String {
    let mut parts = vec![base];
    if with_reference {
        parts.push(REFERENCE_GUIDANCE);
    }
    if multi_turn {
        parts.push(MULTI_TURN_FOCUS);
    }
    parts.push(format);
    parts.join(" ")
}

fn push_transcript(out: &mut String, title: &str, speaker: &str, question: &Question, answers: &[&str]) {
    let _ = writeln!(out, "<|The Start of {}|>", title);
    for (turn, answer) in question.turns.iter().zip(answers) {
        let _ = write!(out, "\n### User:\n{}\n\n### {}:\n{}\n", turn, speaker, answer);
    }
    let _ = write!(out, "\n<|The End of {}|>", title);
}
