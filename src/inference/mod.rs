// Core backend abstraction
pub mod backend;
pub mod types;

// Device selection
pub mod device;

// Backend implementations
pub mod candle;

pub use backend::{LoadedModel, ModelBackend};
pub use candle::CandleBackend;
pub use device::select_device;
pub use types::{GenerationParams, LoadSpec, ModelError};

#[cfg(test)]
pub mod testing;
