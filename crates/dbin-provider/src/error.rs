//! Error types for container providers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to connect to container runtime: {0}")]
    ConnectionError(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    #[error("Pull failed: {0}")]
    PullError(String),

    #[error("Exec failed: {0}")]
    ExecError(String),

    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timeout waiting for operation")]
    Timeout,
}

impl ProviderError {
    /// True when the engine reported the target resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ContainerNotFound(_) | Self::ImageNotFound(_) | Self::NetworkNotFound(_)
        )
    }
}

impl From<bollard::errors::Error> for ProviderError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => Self::ContainerNotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => Self::RuntimeError(format!("{} (status {})", message, status_code)),
            bollard::errors::Error::IOError { err } => Self::IoError(err),
            other => Self::RuntimeError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_404_maps_to_not_found() {
        let err: ProviderError = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".to_string(),
        }
        .into();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_server_error_keeps_status() {
        let err: ProviderError = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "conflict".to_string(),
        }
        .into();
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "Container runtime error: conflict (status 409)");
    }
}
