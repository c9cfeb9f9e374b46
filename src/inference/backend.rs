use async_trait::async_trait;

use super::types::{GenerationParams, LoadSpec, ModelError};

/// Trait for inference backends that can load a model artifact under a
/// declared family
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Load the artifact described by `spec`
    ///
    /// Backends are free to reject a family that does not match the
    /// artifact; the caller treats that as a recoverable failure.
    async fn load(&self, spec: &LoadSpec) -> Result<Box<dyn LoadedModel>, ModelError>;

    /// Get the backend type identifier (e.g., "candle")
    fn backend_type(&self) -> &'static str;
}

/// A model instance produced by [`ModelBackend::load`]
#[async_trait]
pub trait LoadedModel: Send {
    /// Generate a completion for an already composed prompt
    async fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError>;
}
