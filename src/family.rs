use std::fmt;

use serde::Serialize;

/// Model families the inference backend knows how to interpret a GGUF file as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Llama,
    Mistral,
    Phi3,
    Qwen2,
}

/// Fallback vocabulary, in the order candidates are tried after the primary guess
pub const FALLBACK_ORDER: [ModelFamily; 4] = [
    ModelFamily::Llama,
    ModelFamily::Mistral,
    ModelFamily::Phi3,
    ModelFamily::Qwen2,
];

/// Filename rules, evaluated top to bottom. The first rule with a matching
/// pattern wins, so a file named after two families resolves to the earlier one.
static RULES: &[(&[&str], ModelFamily)] = &[
    (&["mistral"], ModelFamily::Mistral),
    (&["phi-3", "phi3", "phi"], ModelFamily::Phi3),
    (&["qwen2", "qwen"], ModelFamily::Qwen2),
    (&["llama-3.1", "llama-3", "llama"], ModelFamily::Llama),
];

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Llama => "llama",
            ModelFamily::Mistral => "mistral",
            ModelFamily::Phi3 => "phi3",
            ModelFamily::Qwen2 => "qwen2",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guess the model family from a filename.
///
/// Returns `None` when no rule matches; callers fall back to the full
/// vocabulary in that case.
pub fn classify(filename: &str) -> Option<ModelFamily> {
    let lowered = filename.to_lowercase();

    RULES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|pattern| lowered.contains(pattern)))
        .map(|(_, family)| *family)
}
