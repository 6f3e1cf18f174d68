use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

mod aggregate;
mod client;
mod config;
mod error;
mod generation;
mod logging;
mod models;
mod output;
mod parser;
mod prompt;
mod questions;
mod runner;
mod store;

use crate::client::{ChatBackend, OpenAiChat};
use crate::config::Config;
use crate::generation::AnswerGenerator;
use crate::models::Mode;
use crate::output::OutputFormat;
use crate::parser::PatternParser;
use crate::prompt::PromptBuilder;
use crate::questions::QuestionSet;
use crate::runner::{Runner, build_matches};
use crate::store::{AnswerStore, JsonLinesWriter, JudgmentStore, answer_path, judgment_path};

/// Japanese LLM benchmark - generate answers, judge them with an LLM and summarize win rates
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    config: PathBuf,

    /// Verbose output - log every request
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate candidate answers for the configured models
    Generate {
        /// Only generate for these model ids (default: all configured models)
        #[arg(long = "model")]
        models: Vec<String>,
    },
    /// Judge stored answers and append verdicts
    Judge {
        #[arg(long, value_enum)]
        mode: Mode,
        /// Models to judge (default: every model with an answer file)
        #[arg(long = "model")]
        models: Vec<String>,
        /// Baseline model for pairwise-baseline mode
        #[arg(long)]
        baseline: Option<String>,
        /// Judge calls in flight at once (overrides the config)
        #[arg(long)]
        parallel: Option<usize>,
        /// Judge again even if a verdict is already stored
        #[arg(long)]
        rejudge: bool,
    },
    /// Summarize stored verdicts
    Show {
        #[arg(long, value_enum)]
        mode: Mode,
        /// Models to report (default: every judged model)
        #[arg(long = "model")]
        models: Vec<String>,
        #[arg(long)]
        baseline: Option<String>,
        /// Output format: plain or json
        #[arg(short, long, default_value = "plain")]
        output: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing(args.verbose, args.log_json)?;

    let config = Config::from_file(&args.config)?;

    match args.command {
        Command::Generate { models } => generate(&config, &models).await,
        Command::Judge {
            mode,
            models,
            baseline,
            parallel,
            rejudge,
        } => {
            let baseline = baseline.or_else(|| config.judge.baseline_model.clone());
            judge(&config, mode, models, baseline.as_deref(), parallel, rejudge).await
        }
        Command::Show {
            mode,
            models,
            baseline,
            output,
        } => {
            // only pairwise-baseline leaves a model out of the table
            let baseline = match mode {
                Mode::PairwiseBaseline => baseline.or_else(|| config.judge.baseline_model.clone()),
                _ => None,
            };
            show(&config, mode, &models, baseline.as_deref(), output)
        }
    }
}

fn load_questions(config: &Config) -> anyhow::Result<QuestionSet> {
    let questions = QuestionSet::from_file(&config.data.question_file)?;
    if questions.is_empty() {
        bail!("No questions in {}", config.data.question_file.display());
    }
    Ok(questions)
}

async fn generate(config: &Config, selected: &[String]) -> anyhow::Result<()> {
    let questions = load_questions(config)?;
    let existing = AnswerStore::from_dir(&config.data.answer_dir)?;

    let targets = if selected.is_empty() {
        config.models.iter().collect::<Vec<_>>()
    } else {
        selected
            .iter()
            .map(|id| {
                config
                    .model(id)
                    .with_context(|| format!("Model '{}' is not configured", id))
            })
            .collect::<anyhow::Result<Vec<_>>>()?
    };
    if targets.is_empty() {
        bail!("No models configured for answer generation");
    }

    for model in targets {
        let client = OpenAiChat::from_env(model.api.clone())?;
        let mut writer = JsonLinesWriter::open(&answer_path(&config.data.answer_dir, &model.id))?;
        let generator = AnswerGenerator::new(&model.id, client, model.system_prompt.clone());
        generator.run(&questions, &existing, &mut writer).await?;
    }
    Ok(())
}

/// Reference answers are keyed by the file stem, like candidate answer files
fn load_references(path: &Path) -> anyhow::Result<(AnswerStore, String)> {
    let model_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Invalid reference answer file name: {}", path.display()))?
        .to_string();
    let mut store = AnswerStore::new();
    store.load_file(path, &model_id)?;
    Ok((store, model_id))
}

async fn judge(
    config: &Config,
    mode: Mode,
    models: Vec<String>,
    baseline: Option<&str>,
    parallel: Option<usize>,
    rejudge: bool,
) -> anyhow::Result<()> {
    let questions = load_questions(config)?;
    let answers = AnswerStore::from_dir(&config.data.answer_dir)?;
    let models = if models.is_empty() { answers.models() } else { models };
    tracing::info!(
        mode = %mode,
        questions = questions.len(),
        answers = answers.len(),
        models = models.len(),
        "loaded benchmark data"
    );

    let references = config
        .data
        .reference_answer_file
        .as_deref()
        .map(load_references)
        .transpose()?;

    let mut builder = PromptBuilder::new(&answers)
        .with_system_prompts(
            config.judge.single_system_prompt.clone(),
            config.judge.pairwise_system_prompt.clone(),
        )
        .with_score_range(config.judge.score_min, config.judge.score_max);
    if let Some((store, model_id)) = &references {
        builder = builder.with_references(store, model_id.clone(), &config.judge.reference_categories);
    }

    let matches = build_matches(mode, &questions, &models, baseline)?;

    let client = OpenAiChat::from_env(config.judge.api.clone())?;
    let parser = PatternParser::new(
        config.judge.score_min,
        config.judge.score_max,
        config.judge.tie_delta,
    )
    .context("Failed to compile verdict patterns")?;

    let path = judgment_path(&config.data.judgment_dir, client.model_name(), mode);
    let already_judged = if rejudge {
        BTreeSet::new()
    } else {
        JudgmentStore::judged_keys(&path)?
    };
    let mut writer = JudgmentStore::open_writer(&path)?;

    let runner = Runner::new(client, parser, parallel.unwrap_or(config.judge.parallel));
    let report = runner
        .run(mode, &matches, &questions, &builder, &already_judged, &mut writer)
        .await?;

    tracing::info!(
        path = %writer.path().display(),
        judged = report.judged,
        errors = report.errors,
        skipped = report.skipped,
        resumed = report.resumed,
        "judging finished"
    );
    Ok(())
}

fn show(
    config: &Config,
    mode: Mode,
    models: &[String],
    baseline: Option<&str>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let path = judgment_path(&config.data.judgment_dir, &config.judge.api.model, mode);
    let verdicts = JudgmentStore::load(&path)?;

    if mode.is_pairwise() {
        let summaries = aggregate::summarize_pairwise(&verdicts, mode, models, baseline);
        output::print_pairwise(mode, &summaries, output);
    } else {
        let summaries = aggregate::summarize_single(&verdicts, models);
        output::print_single(&summaries, output);
    }
    Ok(())
}
