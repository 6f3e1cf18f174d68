use thiserror::Error;

/// Failures that affect a single judgment or generation step.
///
/// None of these abort a run on their own; the runner logs them and either
/// skips the match or records an error outcome.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JudgeError {
    /// A required answer is absent, so no prompt can be built
    #[error("missing answer from `{model}` for question {question_id}, turn {turn_index}")]
    MissingAnswer {
        model: String,
        question_id: u32,
        turn_index: usize,
    },

    #[error("question {question_id} has no turn {turn_index}")]
    MissingTurn { question_id: u32, turn_index: usize },

    /// The chat endpoint kept failing after all retries
    #[error("judge API failed after {attempts} attempt(s): {message}")]
    JudgeApi { attempts: u32, message: String },

    #[error("no score in range {min}..={max} found in judge output")]
    UnparsableScore { min: u32, max: u32 },

    #[error("no verdict marker found in judge output")]
    UnparsableVerdict,

    /// Same judgment key seen twice; the later record is kept
    #[error("duplicate judgment for {key}, keeping the latest record")]
    DuplicateJudgment { key: String },

    #[error("environment variable {0} not found")]
    MissingApiKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_answer_names_the_key() {
        let err = JudgeError::MissingAnswer {
            model: "rinna-3.6b".to_string(),
            question_id: 81,
            turn_index: 1,
        };
        let message = err.to_string();
        assert!(message.contains("rinna-3.6b"));
        assert!(message.contains("81"));
        assert!(message.contains("turn 1"));
    }

    #[test]
    fn test_judge_api_reports_attempts() {
        let err = JudgeError::JudgeApi {
            attempts: 3,
            message: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "judge API failed after 3 attempt(s): rate limited"
        );
    }
}
