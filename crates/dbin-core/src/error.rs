//! Error types for dbin-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] dbin_config::ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] dbin_provider::ProviderError),

    #[error("Unknown database '{0}' (run `dbin list` to see the available databases)")]
    UnknownDatabase(String),

    #[error("Failed to pull image {image}: {message}")]
    Pull { image: String, message: String },

    #[error("Failed to provision {resource}: {message}")]
    Provision { resource: String, message: String },

    #[error("{target} was not ready after {attempts} attempts")]
    ReadinessTimeout { target: String, attempts: u32 },

    #[error("Client could not connect after {attempts} attempts")]
    ClientConnect { attempts: u32 },

    #[error("Client session failed: {0}")]
    ClientFailed(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn provision(resource: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Provision {
            resource: resource.into(),
            message: err.to_string(),
        }
    }

    /// Process exit code for a run that ended with this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
