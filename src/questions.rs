use crate::models::Question;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// The fixed benchmark question set, in file order
#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    questions: Vec<Question>,
    index: HashMap<u32, usize>,
}

impl QuestionSet {
    /// Load questions from a JSON-lines file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read question file: {}", path.display()))?;

        let mut questions = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let question: Question = serde_json::from_str(line).with_context(|| {
                format!("Invalid question at {}:{}", path.display(), line_no + 1)
            })?;
            questions.push(question);
        }

        let set = Self::new(questions)?;
        tracing::debug!(path = %path.display(), count = set.len(), "loaded questions");
        Ok(set)
    }

    pub fn new(questions: Vec<Question>) -> Result<Self> {
        let mut index = HashMap::with_capacity(questions.len());
        for (position, question) in questions.iter().enumerate() {
            if question.turns.is_empty() {
                anyhow::bail!("Question {} has no turns", question.question_id);
            }
            if index.insert(question.question_id, position).is_some() {
                anyhow::bail!("Duplicate question id {}", question.question_id);
            }
        }
        Ok(Self { questions, index })
    }

    pub fn get(&self, question_id: u32) -> Option<&Question> {
        self.index.get(&question_id).map(|&i| &self.questions[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_questions() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"question_id": 1, "category": "writing", "turns": ["日本の四季について書いてください。", "俳句にしてください。"]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"question_id": 2, "category": "math", "turns": ["3+5は？"]}}"#
        )
        .unwrap();

        let set = QuestionSet::from_file(file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1).unwrap().turns.len(), 2);
        assert_eq!(set.get(2).unwrap().category, "math");
        assert!(set.get(3).is_none());
        let ids: Vec<u32> = set.iter().map(|q| q.question_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_duplicate_question_id_rejected() {
        let question = Question {
            question_id: 5,
            category: "roleplay".to_string(),
            turns: vec!["a".to_string()],
        };
        let err = QuestionSet::new(vec![question.clone(), question]).unwrap_err();
        assert!(err.to_string().contains("Duplicate question id 5"));
    }

    #[test]
    fn test_invalid_line_reports_position() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        let err = QuestionSet::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains(":1"));
    }
}
