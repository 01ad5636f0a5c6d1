//! Configuration, prompt assembly and pipeline wiring.

pub mod bootstrap;
pub mod config;
pub mod pipeline;
pub mod prompt;

pub use config::{Config, ConfigError};
pub use pipeline::{PipelineError, PipelineOutput, run};
pub use prompt::Prompter;
