use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] farmflo_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Snapshot must be a JSON array of crop documents")]
    InvalidSnapshot,
    #[error("Demo step timed out: {0}")]
    DemoTimeout(String),
    #[error("Demo failed: {0}")]
    Demo(String),
}
