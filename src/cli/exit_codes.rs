//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::protocol::ProtocolError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 4;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 5;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 6;

    /// Protocol error
    pub const PROTOCOL_ERROR: u8 = 7;

    /// User cancelled
    pub const CANCELLED: u8 = 8;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 9;

    /// Invalid frames were seen
    pub const VALIDATION_FAILED: u8 = 10;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;

    /// Every code, in table order
    pub const ALL: [u8; 12] = [
        Self::SUCCESS,
        Self::ERROR,
        Self::INVALID_ARGS,
        Self::CONNECTION_FAILED,
        Self::FILE_NOT_FOUND,
        Self::PERMISSION_DENIED,
        Self::CONFIG_ERROR,
        Self::PROTOCOL_ERROR,
        Self::CANCELLED,
        Self::PORT_NOT_FOUND,
        Self::VALIDATION_FAILED,
        Self::INTERNAL_ERROR,
    ];
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    pub fn success() -> Self {
        Self::Success(None)
    }

    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, msg.into())
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::Error(ExitCodes::FILE_NOT_FOUND, format!("File not found: {}", path))
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::CANCELLED, msg.into())
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::VALIDATION_FAILED, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn io_exit_code(kind: std::io::ErrorKind) -> u8 {
    use std::io::ErrorKind;

    match kind {
        ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
        ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
        ErrorKind::ConnectionRefused => ExitCodes::CONNECTION_FAILED,
        _ => ExitCodes::ERROR,
    }
}

fn transport_exit_code(err: &TransportError) -> u8 {
    match err {
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::InvalidConfiguration(_) => ExitCodes::INVALID_ARGS,
        TransportError::IoError(io) => match io_exit_code(io.kind()) {
            ExitCodes::ERROR => ExitCodes::CONNECTION_FAILED,
            code => code,
        },
        _ => ExitCodes::CONNECTION_FAILED,
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        Self::Error(io_exit_code(err.kind()), err.to_string())
    }
}

impl From<TransportError> for CliResult {
    fn from(err: TransportError) -> Self {
        Self::Error(transport_exit_code(&err), err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<ProtocolError> for CliResult {
    fn from(err: ProtocolError) -> Self {
        Self::Error(ExitCodes::PROTOCOL_ERROR, err.to_string())
    }
}

impl From<anyhow::Error> for CliResult {
    fn from(err: anyhow::Error) -> Self {
        let code = if let Some(transport) = err.downcast_ref::<TransportError>() {
            transport_exit_code(transport)
        } else if let Some(io) = err.downcast_ref::<std::io::Error>() {
            io_exit_code(io.kind())
        } else if err.downcast_ref::<ConfigError>().is_some() {
            ExitCodes::CONFIG_ERROR
        } else if err.downcast_ref::<ProtocolError>().is_some() {
            ExitCodes::PROTOCOL_ERROR
        } else {
            ExitCodes::ERROR
        };

        Self::Error(code, format!("{:#}", err))
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        ExitCodes::SUCCESS => "Success",
        ExitCodes::ERROR => "General error",
        ExitCodes::INVALID_ARGS => "Invalid arguments",
        ExitCodes::CONNECTION_FAILED => "Connection failed",
        ExitCodes::FILE_NOT_FOUND => "File not found",
        ExitCodes::PERMISSION_DENIED => "Permission denied",
        ExitCodes::CONFIG_ERROR => "Configuration error",
        ExitCodes::PROTOCOL_ERROR => "Protocol error",
        ExitCodes::CANCELLED => "Operation cancelled",
        ExitCodes::PORT_NOT_FOUND => "Port not found",
        ExitCodes::VALIDATION_FAILED => "Validation failed",
        ExitCodes::INTERNAL_ERROR => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in ExitCodes::ALL {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Connection failed");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::FILE_NOT_FOUND);
    }

    #[test]
    fn test_from_transport_error() {
        let result = CliResult::from(TransportError::PortNotFound("COM9".to_string()));
        assert_eq!(result.code(), ExitCodes::PORT_NOT_FOUND);

        let result = CliResult::from(TransportError::PermissionDenied("/dev/ttyS0".to_string()));
        assert_eq!(result.code(), ExitCodes::PERMISSION_DENIED);

        let result = CliResult::from(TransportError::Disconnected);
        assert_eq!(result.code(), ExitCodes::CONNECTION_FAILED);
    }

    #[test]
    fn test_from_anyhow_keeps_transport_code() {
        let err = anyhow::Error::new(TransportError::PortNotFound("COM9".to_string()))
            .context("Failed to open serial port");
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::PORT_NOT_FOUND);
        assert!(result.message().unwrap_or_default().contains("COM9"));

        let result = CliResult::from(anyhow::anyhow!("something else"));
        assert_eq!(result.code(), ExitCodes::ERROR);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exit_code_description(ExitCodes::VALIDATION_FAILED), "Validation failed");
        assert_eq!(exit_code_description(200), "Unknown error");
    }

    #[test]
    fn test_codes_are_contiguous() {
        // 0..=10 with no gaps, then the catch-all internal error
        let (internal, numbered) = ExitCodes::ALL.split_last().unwrap();
        assert_eq!(*internal, ExitCodes::INTERNAL_ERROR);
        for (expected, code) in numbered.iter().enumerate() {
            assert_eq!(usize::from(*code), expected);
            assert_ne!(exit_code_description(*code), "Unknown error");
        }
        assert_eq!(CliResult::cancelled("stopped").code(), ExitCodes::CANCELLED);
        assert_eq!(CliResult::file_not_found("x.bin").message(), Some("File not found: x.bin"));
    }
}
