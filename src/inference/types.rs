use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::family::ModelFamily;

/// Everything a backend needs to load one artifact under one declared family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    /// Directory holding the model (and its tokenizer)
    pub directory: PathBuf,
    /// Artifact file name inside `directory`
    pub filename: OsString,
    /// Family the backend should interpret the weights as
    pub family: ModelFamily,
    /// Layers to offload to an accelerator; 0 keeps everything on the CPU
    pub gpu_layers: usize,
    /// Worker threads the backend may use for its own computation
    pub threads: usize,
}

impl LoadSpec {
    pub fn model_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

/// Sampling settings for a single generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub seed: u64,
    /// Only non-streaming generation is requested by the attempt loop
    pub stream: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.7,
            top_p: None,
            seed: 299792458,
            stream: false,
        }
    }
}

/// Errors that can occur while loading a model or generating with it
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    LoadError(String),

    #[error("Model inference failed: {0}")]
    InferenceError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Candle error: {0}")]
    CandleError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),
}

impl From<candle_core::Error> for ModelError {
    fn from(err: candle_core::Error) -> Self {
        ModelError::CandleError(err.to_string())
    }
}

impl From<tokenizers::Error> for ModelError {
    fn from(err: tokenizers::Error) -> Self {
        ModelError::TokenizerError(err.to_string())
    }
}
