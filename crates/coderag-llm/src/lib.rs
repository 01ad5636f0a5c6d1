//! Generation and embedding providers.

pub mod architecture;
#[cfg(feature = "candle")]
pub mod candle_provider;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod provider;
pub mod template;

pub use architecture::EmbedArchitecture;
pub use error::LlmError;
pub use provider::{EmbeddingProvider, LlmProvider, Message, Role};
pub use template::ChatTemplate;
