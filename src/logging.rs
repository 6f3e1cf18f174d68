use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable that overrides the log filter
pub const LOG_ENV: &str = "JP_LLM_JUDGE_LOG";

/// Filter directive for the command line flags
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "jp_llm_judge=debug"
    } else {
        "jp_llm_judge=info"
    }
}

/// Initialize structured logging to stderr
pub fn init_tracing(verbose: bool, log_json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_ansi(false))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
