pub mod attempt;
pub mod cli;
pub mod config;
pub mod fallback;
pub mod family;
pub mod inference;
pub mod logging;
pub mod selector;

use std::num::NonZeroUsize;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use serde_json::json;

use attempt::{AttemptLoop, Completion};
use config::InferenceConfig;
use fallback::CandidateList;
use family::FALLBACK_ORDER;
use inference::{CandleBackend, ModelBackend};
use selector::ModelLocation;

pub const EXIT_USAGE: u8 = 1;
pub const EXIT_FAILURE: u8 = 2;

/// Result of a successful invocation
#[derive(Debug)]
pub struct Outcome {
    pub location: ModelLocation,
    pub candidates: CandidateList,
    pub completion: Completion,
}

impl Outcome {
    pub fn to_json(&self) -> serde_json::Value {
        let failed_attempts = self
            .completion
            .failures
            .iter()
            .map(|failure| {
                json!({
                    "family": failure.family,
                    "error": failure.error.to_string()
                })
            })
            .collect::<Vec<_>>();

        json!({
            "success": true,
            "response": self.completion.text,
            "family": self.completion.family,
            "file": self.location.path().display().to_string(),
            "candidates": self.candidates,
            "failed_attempts": failed_attempts
        })
    }
}

pub fn run() -> ExitCode {
    let config = match cli::CliConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            println!("error: {error}");
            cli::print_usage();
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if config.show_version {
        cli::print_version();
    }

    if config.show_help {
        cli::print_help();
    }

    let Some(request) = config.request else {
        return ExitCode::SUCCESS;
    };

    logging::init(config.debug);

    let settings = InferenceConfig::from_env();
    let cpus = std::thread::available_parallelism()
        .ok()
        .map(NonZeroUsize::get);
    let model_path = std::path::absolute(&request.model_path).unwrap_or(request.model_path);

    let result = tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")
        .and_then(|runtime| {
            let result = runtime.block_on(execute(
                &CandleBackend::new(),
                &settings,
                &model_path,
                &request.message,
                cpus,
            ));
            // Timed-out attempts may still occupy blocking threads
            runtime.shutdown_background();
            result
        });

    match result {
        Ok(outcome) => {
            if config.json {
                print_json(outcome.to_json());
            } else {
                println!("{}", outcome.completion.text);
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            report_failure(&error, config.json);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Resolve the model, plan the family order and run the attempt loop.
///
/// `cpus` is the processing-unit count used for the thread hint.
pub async fn execute<B: ModelBackend + ?Sized>(
    backend: &B,
    settings: &InferenceConfig,
    model_path: &Path,
    message: &str,
    cpus: Option<usize>,
) -> anyhow::Result<Outcome> {
    let location = selector::resolve(model_path)
        .with_context(|| format!("failed to locate a model at {}", model_path.display()))?;

    let primary = family::classify(&location.display_name());
    let candidates = fallback::plan(primary, &FALLBACK_ORDER);

    log::info!("model_dir={}", location.directory.display());
    log::info!("model_file={}", location.display_name());
    log::debug!(
        "guessed family={}",
        primary.map(|family| family.as_str()).unwrap_or("unknown")
    );
    log::info!("try order={candidates}");

    let attempt_loop = AttemptLoop::new(backend, settings, cpus);
    log::debug!(
        "backend={} threads={}",
        backend.backend_type(),
        attempt_loop.threads()
    );

    let completion = attempt_loop
        .run(&location, &candidates, message)
        .await
        .with_context(|| format!("inference failed for {}", location.path().display()))?;

    Ok(Outcome {
        location,
        candidates,
        completion,
    })
}

fn report_failure(error: &anyhow::Error, json: bool) {
    if json {
        print_json(json!({
            "success": false,
            "response": format!("{error:#}")
        }));
    } else {
        println!("error: {error:#}");
    }

    eprintln!("{error:?}");
}

fn print_json(value: serde_json::Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(json_text) => println!("{json_text}"),
        Err(error) => eprintln!("failed to serialize CLI output: {error}"),
    }
}
