use crate::error::JudgeError;
use crate::models::{Answer, Mode, Verdict, VerdictKey};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Generated answers keyed by (model, question, turn)
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    answers: HashMap<(String, u32, usize), String>,
    models: BTreeSet<String>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `<model_id>.jsonl` file in a directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut store = Self::new();
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "answer directory does not exist");
            return Ok(store);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read answer directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        files.sort();

        for path in files {
            let Some(model_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let model_id = model_id.to_string();
            store.load_file(&path, &model_id)?;
        }
        Ok(store)
    }

    /// Load one answer file; records without a model id are attributed to `model_id`
    pub fn load_file(&mut self, path: &Path, model_id: &str) -> Result<()> {
        tracing::debug!(path = %path.display(), model = model_id, "loading model answers");
        for mut answer in read_json_lines::<Answer>(path)? {
            if answer.model_id.is_empty() {
                answer.model_id = model_id.to_string();
            }
            self.insert(answer);
        }
        self.models.insert(model_id.to_string());
        Ok(())
    }

    /// Later inserts for the same key replace earlier ones
    pub fn insert(&mut self, answer: Answer) {
        self.models.insert(answer.model_id.clone());
        self.answers.insert(
            (answer.model_id, answer.question_id, answer.turn_index),
            answer.text,
        );
    }

    pub fn get(&self, model_id: &str, question_id: u32, turn_index: usize) -> Option<&str> {
        self.answers
            .get(&(model_id.to_string(), question_id, turn_index))
            .map(String::as_str)
    }

    /// Like `get`, but names the missing key in the error
    pub fn require(
        &self,
        model_id: &str,
        question_id: u32,
        turn_index: usize,
    ) -> Result<&str, JudgeError> {
        self.get(model_id, question_id, turn_index)
            .ok_or_else(|| JudgeError::MissingAnswer {
                model: model_id.to_string(),
                question_id,
                turn_index,
            })
    }

    /// True when every turn of the question is answered
    pub fn has_all_turns(&self, model_id: &str, question_id: u32, turns: usize) -> bool {
        (0..turns).all(|t| self.get(model_id, question_id, t).is_some())
    }

    /// Model ids in sorted order
    pub fn models(&self) -> Vec<String> {
        self.models.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

/// Path of a model's answer file
pub fn answer_path(dir: &Path, model_id: &str) -> PathBuf {
    dir.join(format!("{}.jsonl", model_id))
}

/// Path of the judgment file for a judge model and mode
pub fn judgment_path(dir: &Path, judge_model: &str, mode: Mode) -> PathBuf {
    let judge = judge_model.replace('/', "_");
    dir.join(format!("{}_{}.jsonl", judge, mode))
}

/// Append-only JSON-lines writer
pub struct JsonLinesWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesWriter {
    /// Open for appending, creating parent directories as needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Write one record and flush it so partial runs keep their progress
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .context("Failed to serialize record to JSON")?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .with_context(|| format!("Failed to write to: {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read a JSON-lines file, skipping blank lines
pub fn read_json_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid record at {}:{}", path.display(), line_no + 1))
        })
        .collect()
}

/// Judgment file for one (judge model, mode)
pub struct JudgmentStore;

impl JudgmentStore {
    /// Load verdicts, keeping the last record for each key.
    ///
    /// A missing file yields no verdicts. Order follows the first appearance
    /// of each key.
    pub fn load(path: &Path) -> Result<Vec<Verdict>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let records: Vec<Verdict> = read_json_lines(path)?;
        let verdicts = dedup_last_write_wins(records);
        tracing::debug!(path = %path.display(), count = verdicts.len(), "loaded judgments");
        Ok(verdicts)
    }

    /// Keys already present in a judgment file
    pub fn judged_keys(path: &Path) -> Result<BTreeSet<VerdictKey>> {
        Ok(Self::load(path)?.iter().map(Verdict::key).collect())
    }

    pub fn open_writer(path: &Path) -> Result<JsonLinesWriter> {
        JsonLinesWriter::open(path)
    }
}

fn dedup_last_write_wins(records: Vec<Verdict>) -> Vec<Verdict> {
    let mut positions: HashMap<VerdictKey, usize> = HashMap::new();
    let mut verdicts: Vec<Verdict> = Vec::with_capacity(records.len());

    for verdict in records {
        let key = verdict.key();
        match positions.get(&key).copied() {
            Some(position) => {
                let err = JudgeError::DuplicateJudgment {
                    key: key.to_string(),
                };
                tracing::warn!("{}", err);
                verdicts[position] = verdict;
            }
            None => {
                positions.insert(key, verdicts.len());
                verdicts.push(verdict);
            }
        }
    }
    verdicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, Winner};
    use tempfile::tempdir;

    fn pairwise_verdict(question_id: u32, winner: Winner, raw: &str) -> Verdict {
        Verdict {
            mode: Mode::PairwiseBaseline,
            question_id,
            turn_index: 0,
            model_a: "rinna-ppo".to_string(),
            model_b: Some("gpt-3.5-turbo".to_string()),
            judge_model: "gpt-4".to_string(),
            raw_judge_text: raw.to_string(),
            swapped_judge_text: Some("[[B]]".to_string()),
            user_prompt: None,
            swapped_user_prompt: None,
            first_winner: Some(winner),
            second_winner: Some(winner),
            outcome: Outcome::Winner(winner),
            error: None,
            tstamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_answer_store_from_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("rinna-ppo.jsonl"),
            "{\"question_id\": 1, \"turn_index\": 0, \"text\": \"春は桜。\"}\n\
             {\"question_id\": 1, \"turn_index\": 1, \"text\": \"桜散る\"}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = AnswerStore::from_dir(dir.path()).unwrap();
        assert_eq!(store.models(), vec!["rinna-ppo".to_string()]);
        assert_eq!(store.get("rinna-ppo", 1, 1), Some("桜散る"));
        assert!(store.has_all_turns("rinna-ppo", 1, 2));
        assert!(!store.has_all_turns("rinna-ppo", 1, 3));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_answer_store_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let store = AnswerStore::from_dir(&dir.path().join("absent")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_require_names_missing_key() {
        let store = AnswerStore::new();
        let err = store.require("alpaca", 4, 1).unwrap_err();
        assert_eq!(
            err,
            JudgeError::MissingAnswer {
                model: "alpaca".to_string(),
                question_id: 4,
                turn_index: 1,
            }
        );
    }

    #[test]
    fn test_answer_writer_appends_and_reloads() {
        let dir = tempdir().unwrap();
        let path = answer_path(&dir.path().join("answers"), "sft-v2");
        let mut writer = JsonLinesWriter::open(&path).unwrap();
        writer
            .append(&Answer {
                model_id: "sft-v2".to_string(),
                question_id: 9,
                turn_index: 0,
                text: "回答".to_string(),
            })
            .unwrap();
        drop(writer);

        let store = AnswerStore::from_dir(&dir.path().join("answers")).unwrap();
        assert_eq!(store.get("sft-v2", 9, 0), Some("回答"));
    }

    #[test]
    fn test_verdict_round_trip() {
        let dir = tempdir().unwrap();
        let path = judgment_path(dir.path(), "gpt-4", Mode::PairwiseBaseline);
        let verdict = pairwise_verdict(3, Winner::A, "Assistant A is clearly better. [[A]]");

        let mut writer = JudgmentStore::open_writer(&path).unwrap();
        writer.append(&verdict).unwrap();
        drop(writer);

        let loaded = JudgmentStore::load(&path).unwrap();
        assert_eq!(loaded, vec![verdict]);
    }

    #[test]
    fn test_single_verdict_round_trip_without_model_b() {
        let dir = tempdir().unwrap();
        let path = judgment_path(dir.path(), "gpt-4", Mode::Single);
        let verdict = Verdict {
            mode: Mode::Single,
            question_id: 12,
            turn_index: 1,
            model_a: "alpaca".to_string(),
            model_b: None,
            judge_model: "gpt-4".to_string(),
            raw_judge_text: "Rating: [[6]]".to_string(),
            swapped_judge_text: None,
            user_prompt: None,
            swapped_user_prompt: None,
            first_winner: None,
            second_winner: None,
            outcome: Outcome::Score(6.0),
            error: None,
            tstamp: 42,
        };

        let mut writer = JudgmentStore::open_writer(&path).unwrap();
        writer.append(&verdict).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("model_b"));
        assert_eq!(JudgmentStore::load(&path).unwrap(), vec![verdict]);
    }

    #[test]
    fn test_duplicate_judgment_last_write_wins() {
        let dir = tempdir().unwrap();
        let path = judgment_path(dir.path(), "gpt-4", Mode::PairwiseBaseline);

        let mut writer = JudgmentStore::open_writer(&path).unwrap();
        writer.append(&pairwise_verdict(1, Winner::A, "first")).unwrap();
        writer.append(&pairwise_verdict(2, Winner::Tie, "other")).unwrap();
        writer.append(&pairwise_verdict(1, Winner::B, "second")).unwrap();
        drop(writer);

        let loaded = JudgmentStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].question_id, 1);
        assert_eq!(loaded[0].raw_judge_text, "second");
        assert_eq!(loaded[0].outcome, Outcome::Winner(Winner::B));
        assert_eq!(JudgmentStore::judged_keys(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_load_missing_judgment_file() {
        let dir = tempdir().unwrap();
        let path = judgment_path(dir.path(), "gpt-4", Mode::Single);
        assert!(JudgmentStore::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_judgment_path_layout() {
        let path = judgment_path(Path::new("data/judgment"), "openai/gpt-4", Mode::PairwiseAll);
        assert_eq!(path, Path::new("data/judgment/openai_gpt-4_pairwise-all.jsonl"));
    }

    #[test]
    fn test_unwritable_output_path_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let result = JsonLinesWriter::open(&blocker.join("judgment.jsonl"));
        assert!(result.is_err());
    }
}
