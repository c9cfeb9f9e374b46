use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::{quantized_llama, quantized_phi3, quantized_qwen2};
use tokenizers::Tokenizer;

use super::backend::{LoadedModel, ModelBackend};
use super::device::select_device;
use super::types::{GenerationParams, LoadSpec, ModelError};
use crate::family::ModelFamily;

/// Text the model emits when it starts writing the next user turn itself
const TURN_MARKER: &str = "\nUser:";

/// Candle-based backend that loads quantized GGUF weights on demand
#[derive(Debug, Default, Clone, Copy)]
pub struct CandleBackend;

impl CandleBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelBackend for CandleBackend {
    async fn load(&self, spec: &LoadSpec) -> Result<Box<dyn LoadedModel>, ModelError> {
        let spec = spec.clone();

        // Weight loading is blocking and CPU heavy
        let session = tokio::task::spawn_blocking(move || CandleSession::load(&spec))
            .await
            .map_err(|e| ModelError::LoadError(format!("Task join error: {}", e)))??;

        Ok(Box::new(CandleModel {
            session: Arc::new(Mutex::new(session)),
        }))
    }

    fn backend_type(&self) -> &'static str {
        "candle"
    }
}

/// Quantized weights for each family the backend can interpret
enum FamilyWeights {
    Llama(quantized_llama::ModelWeights),
    Phi3(quantized_phi3::ModelWeights),
    Qwen2(quantized_qwen2::ModelWeights),
}

impl FamilyWeights {
    fn from_gguf<R: std::io::Read + std::io::Seek>(
        family: ModelFamily,
        content: gguf_file::Content,
        reader: &mut R,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let weights = match family {
            // Mistral GGUF files use the llama tensor layout and metadata keys
            ModelFamily::Llama | ModelFamily::Mistral => Self::Llama(
                quantized_llama::ModelWeights::from_gguf(content, reader, device)?,
            ),
            ModelFamily::Phi3 => Self::Phi3(quantized_phi3::ModelWeights::from_gguf(
                false, content, reader, device,
            )?),
            ModelFamily::Qwen2 => Self::Qwen2(quantized_qwen2::ModelWeights::from_gguf(
                content, reader, device,
            )?),
        };

        Ok(weights)
    }

    fn forward(&mut self, input: &Tensor, index_pos: usize) -> candle_core::Result<Tensor> {
        match self {
            Self::Llama(model) => model.forward(input, index_pos),
            Self::Phi3(model) => model.forward(input, index_pos),
            Self::Qwen2(model) => model.forward(input, index_pos),
        }
    }
}

/// End-of-sequence spellings per family; only those present in the
/// tokenizer vocabulary are used.
fn eos_candidates(family: ModelFamily) -> &'static [&'static str] {
    match family {
        ModelFamily::Llama | ModelFamily::Mistral => &["</s>", "<|eot_id|>", "<|end_of_text|>"],
        ModelFamily::Phi3 => &["<|end|>", "<|endoftext|>"],
        ModelFamily::Qwen2 => &["<|im_end|>", "<|endoftext|>"],
    }
}

struct CandleSession {
    family: ModelFamily,
    weights: FamilyWeights,
    tokenizer: Tokenizer,
    device: Device,
    eos_tokens: Vec<u32>,
    pool: rayon::ThreadPool,
}

impl CandleSession {
    fn load(spec: &LoadSpec) -> Result<Self, ModelError> {
        let model_path = spec.model_path();
        let device = select_device(spec.gpu_layers)?;

        log::debug!(
            "Loading {:?} as {} on {:?} with {} thread(s)",
            model_path,
            spec.family,
            device,
            spec.threads
        );

        if !model_path.exists() {
            return Err(ModelError::ConfigError(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }

        let tokenizer = load_tokenizer(&spec.directory)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(spec.threads.max(1))
            .build()
            .map_err(|e| ModelError::ConfigError(format!("Failed to build thread pool: {}", e)))?;

        let mut file = std::fs::File::open(&model_path).map_err(|e| {
            ModelError::LoadError(format!("Failed to open model file {:?}: {}", model_path, e))
        })?;

        let start = Instant::now();
        let weights = pool.install(|| {
            let content = gguf_file::Content::read(&mut file)?;

            if let Some(gguf_file::Value::String(arch)) =
                content.metadata.get("general.architecture")
            {
                log::debug!("GGUF declares architecture '{}'", arch);
            }

            FamilyWeights::from_gguf(spec.family, content, &mut file, &device)
        })?;

        log::debug!(
            "Loaded {} weights in {} ms",
            spec.family,
            start.elapsed().as_millis()
        );

        let eos_tokens = eos_candidates(spec.family)
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect::<Vec<_>>();

        if eos_tokens.is_empty() {
            log::warn!(
                "No end-of-sequence token found for {}; generation runs to the token limit",
                spec.family
            );
        }

        Ok(Self {
            family: spec.family,
            weights,
            tokenizer,
            device,
            eos_tokens,
            pool,
        })
    }

    fn generate(&mut self, prompt: &str, params: &GenerationParams) -> Result<String, ModelError> {
        if params.stream {
            return Err(ModelError::ConfigError(
                "streaming generation is not supported".to_string(),
            ));
        }

        let encoding = self.tokenizer.encode(prompt, true)?;
        let prompt_tokens = encoding.get_ids().to_vec();
        if prompt_tokens.is_empty() {
            return Err(ModelError::InferenceError(
                "prompt encoded to zero tokens".to_string(),
            ));
        }

        let Self {
            family,
            weights,
            tokenizer,
            device,
            eos_tokens,
            pool,
        } = self;

        let start = Instant::now();
        let output_tokens =
            pool.install(|| sample_tokens(weights, device, eos_tokens, &prompt_tokens, params))?;

        log::debug!(
            "{} generated {} token(s) in {} ms",
            family,
            output_tokens.len(),
            start.elapsed().as_millis()
        );

        let text = tokenizer.decode(&output_tokens, true)?;

        Ok(truncate_at_turn_marker(&text).to_string())
    }
}

fn load_tokenizer(directory: &Path) -> Result<Tokenizer, ModelError> {
    let tokenizer_path = directory.join("tokenizer.json");
    if !tokenizer_path.exists() {
        return Err(ModelError::ConfigError(format!(
            "Tokenizer not found at {:?}. Place tokenizer.json next to model file.",
            tokenizer_path
        )));
    }

    Tokenizer::from_file(&tokenizer_path).map_err(|e| {
        ModelError::TokenizerError(format!(
            "Failed to load tokenizer from {:?}: {}",
            tokenizer_path, e
        ))
    })
}

fn sample_tokens(
    weights: &mut FamilyWeights,
    device: &Device,
    eos_tokens: &[u32],
    prompt_tokens: &[u32],
    params: &GenerationParams,
) -> Result<Vec<u32>, ModelError> {
    let mut generated = Vec::new();
    if params.max_new_tokens == 0 {
        return Ok(generated);
    }

    let mut logits_processor =
        LogitsProcessor::new(params.seed, Some(params.temperature), params.top_p);

    let input = Tensor::new(prompt_tokens, device)?.unsqueeze(0)?;
    let logits = weights.forward(&input, 0)?;
    let mut next_token = logits_processor.sample(&last_token_logits(&logits)?)?;
    let mut index_pos = prompt_tokens.len();

    loop {
        if eos_tokens.contains(&next_token) {
            break;
        }

        generated.push(next_token);
        if generated.len() >= params.max_new_tokens {
            break;
        }

        let input = Tensor::new(&[next_token], device)?.unsqueeze(0)?;
        let logits = weights.forward(&input, index_pos)?;
        index_pos += 1;
        next_token = logits_processor.sample(&last_token_logits(&logits)?)?;
    }

    Ok(generated)
}

/// Reduce model output to a 1-D f32 `[vocab]` tensor for the final position.
///
/// The quantized models return `[batch, vocab]`, but a full
/// `[batch, seq, vocab]` or an already squeezed `[vocab]` are accepted too.
fn last_token_logits(logits: &Tensor) -> Result<Tensor, ModelError> {
    let last = match logits.dims() {
        [_, seq_len, _] => logits.i((0, seq_len - 1))?,
        [_, _] => logits.i(0)?,
        [_] => logits.clone(),
        dims => {
            return Err(ModelError::InferenceError(format!(
                "Unexpected logits shape: {dims:?}"
            )))
        }
    };

    Ok(last.to_dtype(DType::F32)?)
}

fn truncate_at_turn_marker(text: &str) -> &str {
    match text.find(TURN_MARKER) {
        Some(index) => &text[..index],
        None => text,
    }
}

/// Loaded candle model; generation runs on the blocking pool
pub struct CandleModel {
    session: Arc<Mutex<CandleSession>>,
}

#[async_trait]
impl LoadedModel for CandleModel {
    async fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        let session = Arc::clone(&self.session);
        let prompt = prompt.to_string();
        let params = params.clone();

        tokio::task::spawn_blocking(move || {
            let mut session = session.lock().map_err(|e| {
                ModelError::InferenceError(format!("Failed to lock model mutex: {}", e))
            })?;
            session.generate(&prompt, &params)
        })
        .await
        .map_err(|e| ModelError::InferenceError(format!("Task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_in(directory: &Path, filename: &str, family: ModelFamily) -> LoadSpec {
        LoadSpec {
            directory: directory.to_path_buf(),
            filename: filename.into(),
            family,
            gpu_layers: 0,
            threads: 2,
        }
    }

    #[tokio::test]
    async fn load_rejects_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CandleBackend::new();

        match backend
            .load(&spec_in(dir.path(), "absent.gguf", ModelFamily::Llama))
            .await
        {
            Err(ModelError::ConfigError(message)) => {
                assert!(message.contains("Model file not found"))
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected load failure"),
        }
    }

    #[tokio::test]
    async fn load_requires_tokenizer_next_to_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("phi3.gguf"), b"not really gguf").unwrap();

        let backend = CandleBackend::new();
        match backend
            .load(&spec_in(dir.path(), "phi3.gguf", ModelFamily::Phi3))
            .await
        {
            Err(ModelError::ConfigError(message)) => assert!(message.contains("tokenizer.json")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected load failure"),
        }
    }

    #[test]
    fn last_token_logits_accepts_known_shapes() {
        let device = Device::Cpu;

        let batch_vocab = Tensor::new(&[[1f32, 2., 3.]], &device).unwrap();
        assert_eq!(last_token_logits(&batch_vocab).unwrap().dims(), &[3]);

        let full = Tensor::new(&[[[1f32, 2.], [3., 4.], [5., 6.]]], &device).unwrap();
        let last = last_token_logits(&full).unwrap();
        assert_eq!(last.to_vec1::<f32>().unwrap(), vec![5., 6.]);

        let flat = Tensor::new(&[7f32, 8.], &device).unwrap();
        assert_eq!(last_token_logits(&flat).unwrap().dims(), &[2]);
    }

    #[test]
    fn last_token_logits_rejects_rank_four() {
        let logits = Tensor::zeros((1, 1, 1, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            last_token_logits(&logits),
            Err(ModelError::InferenceError(_))
        ));
    }

    #[test]
    fn output_is_cut_at_next_user_turn() {
        assert_eq!(
            truncate_at_turn_marker("Sounds like a good day.\nUser: thanks"),
            "Sounds like a good day."
        );
        assert_eq!(truncate_at_turn_marker("no marker"), "no marker");
    }

    #[test]
    fn every_family_has_eos_candidates() {
        for family in crate::family::FALLBACK_ORDER {
            assert!(!eos_candidates(family).is_empty());
        }
    }
}
