use thiserror::Error;

use crate::config::InferenceConfig;
use crate::fallback::CandidateList;
use crate::family::ModelFamily;
use crate::inference::{GenerationParams, LoadSpec, ModelBackend, ModelError};
use crate::selector::ModelLocation;

/// Substituted when the model produced nothing but whitespace
pub const EMPTY_RESPONSE: &str = "empty response";

const DEFAULT_CPU_COUNT: usize = 4;
const MIN_THREADS: usize = 2;

/// A candidate family that failed, and why
#[derive(Debug)]
pub struct AttemptFailure {
    pub family: ModelFamily,
    pub error: ModelError,
}

/// Text produced by the first family that worked
#[derive(Debug)]
pub struct Completion {
    pub text: String,
    pub family: ModelFamily,
    /// Failures recorded before the successful attempt, in attempt order
    pub failures: Vec<AttemptFailure>,
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("all model families failed: tried {candidates}; last error: {last_error}")]
    AllAttemptsFailed {
        candidates: CandidateList,
        #[source]
        last_error: ModelError,
    },

    #[error("no candidate model families to try")]
    NoCandidates,
}

/// Worker threads handed to the backend: half the processing units, at least two.
///
/// `cpus` is the detected processing-unit count; an unknown count is treated as four.
pub fn thread_hint(cpus: Option<usize>) -> usize {
    (cpus.unwrap_or(DEFAULT_CPU_COUNT) / 2).max(MIN_THREADS)
}

/// Single-turn prompt in the plain `User:`/`Assistant:` layout every family accepts
pub fn compose_prompt(system: &str, message: &str) -> String {
    format!("{system}\nUser: {message}\nAssistant:")
}

fn finish_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        EMPTY_RESPONSE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Tries candidate families one after another until a backend call succeeds
pub struct AttemptLoop<'a, B: ModelBackend + ?Sized> {
    backend: &'a B,
    config: &'a InferenceConfig,
    threads: usize,
}

impl<'a, B: ModelBackend + ?Sized> AttemptLoop<'a, B> {
    pub fn new(backend: &'a B, config: &'a InferenceConfig, cpus: Option<usize>) -> Self {
        let threads = config.threads.unwrap_or_else(|| thread_hint(cpus));

        Self {
            backend,
            config,
            threads,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Attempt generation for each candidate in order.
    ///
    /// Backend failures never escape a single iteration; the first success
    /// ends the loop and no further backend calls are made.
    pub async fn run(
        &self,
        location: &ModelLocation,
        candidates: &CandidateList,
        message: &str,
    ) -> Result<Completion, InferenceError> {
        let prompt = compose_prompt(&self.config.system_prompt, message);
        let params = GenerationParams {
            stream: false,
            ..self.config.generation.clone()
        };

        let mut failures: Vec<AttemptFailure> = Vec::new();

        for family in candidates.iter() {
            log::info!("try family={} file={}", family, location.display_name());

            match self.attempt(location, family, &prompt, &params).await {
                Ok(raw) => {
                    log::info!("ok family={} file={}", family, location.display_name());

                    return Ok(Completion {
                        text: finish_text(&raw),
                        family,
                        failures,
                    });
                }
                Err(error) => {
                    log::warn!(
                        "fail family={} file={}: {}",
                        family,
                        location.display_name(),
                        error
                    );
                    failures.push(AttemptFailure { family, error });
                }
            }
        }

        match failures.pop() {
            Some(last) => Err(InferenceError::AllAttemptsFailed {
                candidates: candidates.clone(),
                last_error: last.error,
            }),
            None => Err(InferenceError::NoCandidates),
        }
    }

    async fn attempt(
        &self,
        location: &ModelLocation,
        family: ModelFamily,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        let spec = LoadSpec {
            directory: location.directory.clone(),
            filename: location.filename.clone(),
            family,
            gpu_layers: self.config.gpu_layers,
            threads: self.threads,
        };

        let work = async {
            let mut model = self.backend.load(&spec).await?;
            model.generate(prompt, params).await
        };

        let Some(limit) = self.config.attempt_timeout else {
            return work.await;
        };

        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                // Only the wait is abandoned; the blocking backend task runs to completion
                log::warn!(
                    "family={} timed out after {:?}; its load keeps running and holds memory \
                     while the next family loads",
                    family,
                    limit
                );
                Err(ModelError::Timeout(limit))
            }
        }
    }
}
