use crate::client::{ChatBackend, ChatMessage};
use crate::error::JudgeError;
use crate::models::{Answer, Question};
use crate::questions::QuestionSet;
use crate::store::{AnswerStore, JsonLinesWriter};
use anyhow::Result;

/// Counts reported after generating answers for one model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub answered: usize,
    pub failed: usize,
    /// Questions that already had every turn answered
    pub existing: usize,
}

/// Generates a candidate model's answers turn by turn
pub struct AnswerGenerator<C> {
    model_id: String,
    client: C,
    system_prompt: Option<String>,
}

impl<C: ChatBackend> AnswerGenerator<C> {
    pub fn new(model_id: impl Into<String>, client: C, system_prompt: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            client,
            system_prompt,
        }
    }

    /// Answer every question not fully present in `existing`, appending to `writer`.
    ///
    /// A question whose conversation fails is skipped as a whole so no
    /// partial answer sets are written.
    pub async fn run(
        &self,
        questions: &QuestionSet,
        existing: &AnswerStore,
        writer: &mut JsonLinesWriter,
    ) -> Result<GenerationReport> {
        let mut report = GenerationReport::default();
        let total = questions.len();

        for (index, question) in questions.iter().enumerate() {
            if existing.has_all_turns(&self.model_id, question.question_id, question.turns.len()) {
                report.existing += 1;
                continue;
            }

            tracing::debug!(
                model = %self.model_id,
                question_id = question.question_id,
                "generating answer {}/{}",
                index + 1,
                total
            );

            match self.answer(question).await {
                Ok(answers) => {
                    for answer in &answers {
                        writer.append(answer)?;
                    }
                    report.answered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        model = %self.model_id,
                        question_id = question.question_id,
                        error = %e,
                        "answer generation failed, skipping question"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            model = %self.model_id,
            answered = report.answered,
            failed = report.failed,
            existing = report.existing,
            "answer generation finished"
        );
        Ok(report)
    }

    /// Run the whole conversation for one question, replaying earlier replies
    async fn answer(&self, question: &Question) -> Result<Vec<Answer>, JudgeError> {
        let mut messages = Vec::with_capacity(question.turns.len() * 2 + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }

        let mut answers = Vec::with_capacity(question.turns.len());
        for (turn_index, turn) in question.turns.iter().enumerate() {
            messages.push(ChatMessage::user(turn.clone()));
            let reply = self.client.complete(&messages).await?;
            messages.push(ChatMessage::assistant(reply.clone()));
            answers.push(Answer {
                model_id: self.model_id.clone(),
                question_id: question.question_id,
                turn_index,
                text: reply.trim().to_string(),
            });
        }
        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Role;
    use crate::store::answer_path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Echoes the number of messages it received; fails on a marker question
    struct EchoModel {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ChatBackend for EchoModel {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, JudgeError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            if last.contains("失敗") {
                return Err(JudgeError::JudgeApi {
                    attempts: 1,
                    message: "boom".to_string(),
                });
            }
            Ok(format!(" reply to {} ({} messages)\n", last, messages.len()))
        }
    }

    fn questions() -> QuestionSet {
        QuestionSet::new(vec![
            Question {
                question_id: 1,
                category: "writing".to_string(),
                turns: vec!["一つ目".to_string(), "二つ目".to_string()],
            },
            Question {
                question_id: 2,
                category: "writing".to_string(),
                turns: vec!["失敗する質問".to_string()],
            },
            Question {
                question_id: 3,
                category: "math".to_string(),
                turns: vec!["1+1".to_string()],
            },
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_generates_multi_turn_with_history() {
        let dir = tempdir().unwrap();
        let path = answer_path(dir.path(), "echo");
        let mut writer = JsonLinesWriter::open(&path).unwrap();
        let generator = AnswerGenerator::new(
            "echo",
            EchoModel { seen: Mutex::new(Vec::new()) },
            Some("日本語で答えてください。".to_string()),
        );

        let report = generator
            .run(&questions(), &AnswerStore::new(), &mut writer)
            .await
            .unwrap();
        drop(writer);

        assert_eq!(report, GenerationReport { answered: 2, failed: 1, existing: 0 });

        let seen = generator.client.seen.lock().unwrap();
        // second turn of question 1 carries system, user, assistant, user
        assert_eq!(seen[1].len(), 4);
        assert_eq!(seen[1][0].role, Role::System);
        assert_eq!(seen[1][2].role, Role::Assistant);
        drop(seen);

        let store = AnswerStore::from_dir(dir.path()).unwrap();
        assert_eq!(store.get("echo", 1, 0), Some("reply to 一つ目 (2 messages)"));
        assert_eq!(store.get("echo", 1, 1), Some("reply to 二つ目 (4 messages)"));
        assert!(store.get("echo", 2, 0).is_none());
        assert!(store.get("echo", 3, 0).is_some());
    }

    #[tokio::test]
    async fn test_skips_already_answered_questions() {
        let dir = tempdir().unwrap();
        let mut writer = JsonLinesWriter::open(&answer_path(dir.path(), "echo")).unwrap();
        let mut existing = AnswerStore::new();
        existing.insert(Answer {
            model_id: "echo".to_string(),
            question_id: 3,
            turn_index: 0,
            text: "2".to_string(),
        });

        let generator = AnswerGenerator::new("echo", EchoModel { seen: Mutex::new(Vec::new()) }, None);
        let report = generator.run(&questions(), &existing, &mut writer).await.unwrap();

        assert_eq!(report.existing, 1);
        assert_eq!(report.answered, 1);
        assert!(generator
            .client
            .seen
            .lock()
            .unwrap()
            .iter()
            .all(|messages| messages[0].role == Role::User));
    }
}
