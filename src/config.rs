use std::str::FromStr;
use std::time::Duration;

use crate::inference::GenerationParams;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a friendly journaling assistant. Keep answers concise and supportive.";

/// Runtime settings for the attempt loop, read from `LLM_INFER_*` variables
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// Preamble placed before the user turn
    pub system_prompt: String,
    /// Sampling settings passed to every generation request
    pub generation: GenerationParams,
    /// Accelerator layers requested from the backend (0 = CPU only)
    pub gpu_layers: usize,
    /// Explicit worker thread count; `None` derives it from the CPU count
    pub threads: Option<usize>,
    /// Upper bound for a single load-and-generate attempt
    pub attempt_timeout: Option<Duration>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            generation: GenerationParams::default(),
            gpu_layers: 0,
            threads: None,
            attempt_timeout: None,
        }
    }
}

impl InferenceConfig {
    /// Build configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let system_prompt = lookup("LLM_INFER_SYSTEM_PROMPT")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.system_prompt);

        let generation = GenerationParams {
            max_new_tokens: parse_or(
                &lookup,
                "LLM_INFER_MAX_TOKENS",
                defaults.generation.max_new_tokens,
            ),
            temperature: parse_or(
                &lookup,
                "LLM_INFER_TEMPERATURE",
                defaults.generation.temperature,
            ),
            top_p: parse_optional(&lookup, "LLM_INFER_TOP_P"),
            seed: parse_or(&lookup, "LLM_INFER_SEED", defaults.generation.seed),
            stream: false,
        };

        let threads = parse_optional::<usize, _>(&lookup, "LLM_INFER_THREADS").filter(|n| *n > 0);

        let attempt_timeout = parse_optional::<u64, _>(&lookup, "LLM_INFER_ATTEMPT_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            system_prompt,
            generation,
            gpu_layers: parse_or(&lookup, "LLM_INFER_GPU_LAYERS", defaults.gpu_layers),
            threads,
            attempt_timeout,
        }
    }
}

fn parse_optional<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;

    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid {key} value '{raw}'");
            None
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    parse_optional(lookup, key).unwrap_or(default)
}
