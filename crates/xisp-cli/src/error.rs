// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments
    InvalidArgs(String),
    /// No camera pipeline could be bound
    CameraNotFound(String),
    /// A pipeline stage rejected the requested configuration
    ConfigurationFailed(String),
    /// Buffer or streaming operation failed
    StreamingFailed(String),
    /// Operation timed out
    Timeout(String),
    /// General error
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::CameraNotFound(msg) => write!(f, "Camera not found: {}", msg),
            CliError::ConfigurationFailed(msg) => write!(f, "Configuration failed: {}", msg),
            CliError::StreamingFailed(msg) => write!(f, "Streaming failed: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            CliError::InvalidArgs(_) => 2,
            CliError::CameraNotFound(_) => 3,
            CliError::ConfigurationFailed(_) => 4,
            CliError::StreamingFailed(_) => 5,
            CliError::Timeout(_) => 6,
            CliError::General(_) => 1,
        }
    }
}

/// Map xisp::Error to CliError by failure class
impl From<xisp::Error> for CliError {
    fn from(err: xisp::Error) -> Self {
        use xisp::ErrorKind;

        match err.kind() {
            ErrorKind::Discovery => CliError::CameraNotFound(err.to_string()),
            ErrorKind::Configuration => CliError::ConfigurationFailed(err.to_string()),
            ErrorKind::Streaming => CliError::StreamingFailed(err.to_string()),
            ErrorKind::Usage => CliError::InvalidArgs(err.to_string()),
            ErrorKind::Io => match &err {
                xisp::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::TimedOut => {
                    CliError::Timeout(err.to_string())
                }
                xisp::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                    CliError::CameraNotFound(err.to_string())
                }
                _ => CliError::General(err.to_string()),
            },
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::General(format!("JSON error: {}", err))
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xisp::config::StreamId;
    use xisp::topology::Role;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::InvalidArgs("test".into()).code(), 2);
        assert_eq!(CliError::CameraNotFound("test".into()).code(), 3);
        assert_eq!(CliError::ConfigurationFailed("test".into()).code(), 4);
        assert_eq!(CliError::StreamingFailed("test".into()).code(), 5);
        assert_eq!(CliError::Timeout("test".into()).code(), 6);
        assert_eq!(CliError::General("test".into()).code(), 1);
        assert_eq!(
            CliError::Timeout("test".into()).exit_code(),
            ExitCode::from(6)
        );
    }

    #[test]
    fn test_error_display() {
        let err = CliError::CameraNotFound("imx219 1-0010".to_string());
        assert_eq!(format!("{}", err), "Camera not found: imx219 1-0010");
    }

    #[test]
    fn test_library_error_mapping() {
        let err = CliError::from(xisp::Error::MissingEntity(Role::IspCore));
        assert_eq!(err.code(), 3);

        let err = CliError::from(xisp::Error::InvalidConfiguration("empty"));
        assert_eq!(err.code(), 4);

        let err = CliError::from(xisp::Error::NoPipe(StreamId(1)));
        assert_eq!(err.code(), 5);

        let err = CliError::from(xisp::Error::TooManyStreams {
            requested: 2,
            available: 1,
        });
        assert_eq!(err.code(), 2);

        let timeout = std::io::Error::from(std::io::ErrorKind::TimedOut);
        assert_eq!(CliError::from(xisp::Error::Io(timeout)).code(), 6);

        let other = std::io::Error::from(std::io::ErrorKind::Other);
        assert_eq!(CliError::from(xisp::Error::Io(other)).code(), 1);
    }
}
