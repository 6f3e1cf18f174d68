use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings for an OpenAI-compatible chat endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSettings {
    /// API base URL
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Model name sent with each request
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Requests per second, zero or negative disables limiting
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts per request, including the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff between attempts, doubled after each failure
    #[serde(default = "default_retry_sleep_ms")]
    pub retry_sleep_ms: u64,
}

/// Judge model and prompt settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeConfig {
    #[serde(flatten)]
    pub api: ApiSettings,
    /// Baseline for pairwise-baseline mode when none is given on the command line
    #[serde(default)]
    pub baseline_model: Option<String>,
    /// Judge calls in flight at once
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Score gap at or below which a two-score verdict counts as a tie
    #[serde(default = "default_tie_delta")]
    pub tie_delta: f64,
    #[serde(default = "default_score_min")]
    pub score_min: u32,
    #[serde(default = "default_score_max")]
    pub score_max: u32,
    /// Question categories graded against a reference answer
    #[serde(default = "default_reference_categories")]
    pub reference_categories: Vec<String>,
    #[serde(default)]
    pub single_system_prompt: Option<String>,
    #[serde(default)]
    pub pairwise_system_prompt: Option<String>,
}

/// A candidate model whose answers are generated and judged
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Identifier used for the answer file name and in judgments
    pub id: String,
    #[serde(flatten)]
    pub api: ApiSettings,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// File locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    pub question_file: PathBuf,
    pub answer_dir: PathBuf,
    pub judgment_dir: PathBuf,
    /// Reference answers used for categories in `reference_categories`
    #[serde(default)]
    pub reference_answer_file: Option<PathBuf>,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    16
}

fn default_retry_sleep_ms() -> u64 {
    10_000
}

fn default_parallel() -> usize {
    1
}

fn default_tie_delta() -> f64 {
    0.1
}

fn default_score_min() -> u32 {
    1
}

fn default_score_max() -> u32 {
    10
}

fn default_reference_categories() -> Vec<String> {
    vec!["math".to_string(), "reasoning".to_string(), "coding".to_string()]
}

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub data: DataConfig,
    pub judge: JudgeConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.judge.score_min > self.judge.score_max {
            anyhow::bail!(
                "score_min ({}) is greater than score_max ({})",
                self.judge.score_min,
                self.judge.score_max
            );
        }
        if self.judge.parallel == 0 {
            anyhow::bail!("judge.parallel must be at least 1");
        }
        Ok(())
    }

    pub fn model(&self, id: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_config_parsing() {
        let temp_file = write_config(
            r#"
[data]
question_file = "data/jp_bench/question.jsonl"
answer_dir = "data/jp_bench/model_answer"
judgment_dir = "data/jp_bench/model_judgment"
reference_answer_file = "data/jp_bench/reference_answer/gpt-4.jsonl"

[judge]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4"
temperature = 0.0
max_tokens = 2048
rate_limit_rps = 3.0
baseline_model = "gpt-3.5-turbo"
parallel = 4
reference_categories = ["math"]

[[models]]
id = "rinna-3.6b-ppo"
api_endpoint = "http://localhost:8000/v1"
env_var_api_key = "LOCAL_API_KEY"
model = "rinna/japanese-gpt-neox-3.6b-instruction-ppo"
temperature = 0.5
system_prompt = "あなたは親切なアシスタントです。"
"#,
        );

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.judge.api.model, "gpt-4");
        assert_eq!(config.judge.api.temperature, 0.0);
        assert_eq!(config.judge.api.max_tokens, 2048);
        assert_eq!(config.judge.api.rate_limit_rps, 3.0);
        assert_eq!(config.judge.baseline_model.as_deref(), Some("gpt-3.5-turbo"));
        assert_eq!(config.judge.parallel, 4);
        assert_eq!(config.judge.reference_categories, vec!["math".to_string()]);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].api.temperature, 0.5);
        assert!(config.model("rinna-3.6b-ppo").is_some());
        assert!(config.data.reference_answer_file.is_some());
    }

    #[test]
    fn test_config_defaults() {
        let temp_file = write_config(
            r#"
[data]
question_file = "q.jsonl"
answer_dir = "answers"
judgment_dir = "judgments"

[judge]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4"
"#,
        );

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.judge.api.temperature, 0.7);
        assert_eq!(config.judge.api.max_tokens, 1024);
        assert_eq!(config.judge.api.rate_limit_rps, 10.0);
        assert_eq!(config.judge.api.max_retries, 16);
        assert_eq!(config.judge.parallel, 1);
        assert_eq!(config.judge.tie_delta, 0.1);
        assert_eq!((config.judge.score_min, config.judge.score_max), (1, 10));
        assert_eq!(config.judge.reference_categories.len(), 3);
        assert!(config.judge.baseline_model.is_none());
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_config_rejects_inverted_score_range() {
        let temp_file = write_config(
            r#"
[data]
question_file = "q.jsonl"
answer_dir = "answers"
judgment_dir = "judgments"

[judge]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4"
score_min = 10
score_max = 1
"#,
        );

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("score_min"));
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
