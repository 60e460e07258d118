//! Error handling with codes, context and recovery suggestions
//!
//! Every library crate in the workspace returns [`Result`], built on one
//! structured [`Error`] carrying:
//! - An [`ErrorCode`] for programmatic handling
//! - Optional context and recovery suggestion
//! - The underlying source error

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // General errors (1xxx)
    Internal = 1001,

    // IO errors (2xxx)
    IoError = 2000,
    FileNotFound = 2001,
    PermissionDenied = 2002,
    InvalidPath = 2003,
    DirectoryNotFound = 2004,

    // Configuration errors (3xxx)
    ConfigError = 3000,
    ConfigNotFound = 3001,
    ConfigParseError = 3002,
    MissingPrerequisite = 3004,

    // Descriptor errors (4xxx)
    DescriptorError = 4000,
    DescriptorParse = 4001,
    MissingField = 4002,
    InvalidOverride = 4003,
    ContentUnavailable = 4004,

    // Process errors (5xxx)
    ProcessError = 5000,
    CommandNotFound = 5001,
    CommandFailed = 5002,

    // Build errors (6xxx)
    BuildError = 6000,
    ArtifactMissing = 6001,
    EnvironmentNotApplied = 6002,
    RewriteFailed = 6003,
    UnknownStage = 6004,
    UnknownArch = 6005,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a human-readable category
    pub fn category(&self) -> &'static str {
        match self.code() / 1000 {
            1 => "General",
            2 => "IO",
            3 => "Configuration",
            4 => "Descriptor",
            5 => "Process",
            6 => "Build",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Main error type with rich context
#[derive(Error, Debug)]
pub struct Error {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional context
    pub context: Option<String>,
    /// Recovery suggestion
    pub suggestion: Option<String>,
    /// Source error
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n  Context: {}", ctx)?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl Error {
    /// Create a new error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggestion: None,
            source: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a recovery suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IoError, message)
    }

    pub fn file_not_found(path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::FileNotFound,
            format!("File not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Check that the file exists and you have read permissions")
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    pub fn config_not_found(path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Create a .kiwix-tools.toml file or use --config to specify a path")
    }

    /// A directory, tool or source tree the build needs is absent
    pub fn missing_prerequisite(path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::MissingPrerequisite,
            format!(
                "Required PATH is missing or misdefined: {}",
                path.as_ref().display()
            ),
        )
        .with_suggestion(
            "Check that you have installed the Android NDK properly and run 'make' in 'src/dependencies'",
        )
    }

    /// A stage did not leave its expected output behind
    pub fn artifact_missing(stage: &str, path: impl AsRef<Path>) -> Self {
        Self::new(
            ErrorCode::ArtifactMissing,
            format!(
                "The {} step did not produce {}",
                stage,
                path.as_ref().display()
            ),
        )
        .with_suggestion(format!("Re-run with --{} and inspect the tool output", stage))
    }

    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DescriptorError, message)
    }

    /// Mandatory descriptor fields are absent
    pub fn missing_fields(missing: &[&str], required: &[&str]) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field(s) missing from JSON file: {}", missing.join(", ")),
        )
        .with_suggestion(format!("Required fields are: {}", required.join(", ")))
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProcessError, message)
    }

    pub fn command_not_found(cmd: &str) -> Self {
        Self::new(
            ErrorCode::CommandNotFound,
            format!("Command not found: {}", cmd),
        )
        .with_suggestion(format!("Install {} and ensure it's in your PATH", cmd))
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BuildError, message)
    }

    pub fn rewrite(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RewriteFailed, message)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes for CLI commands
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
}

// Implement From for common error types

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::IoError,
        };
        Error::new(code, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorCode::DescriptorParse, format!("JSON parse error: {}", err))
            .with_source(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::new(ErrorCode::ConfigParseError, format!("TOML parse error: {}", err))
            .with_source(err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::new(ErrorCode::Internal, format!("Regex error: {}", err)).with_source(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::new(ErrorCode::IoError, format!("Directory walk error: {}", err)).with_source(err)
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_suggestion(suggestion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::FileNotFound.to_string(), "E2001");
        assert_eq!(ErrorCode::ArtifactMissing.to_string(), "E6001");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::IoError.category(), "IO");
        assert_eq!(ErrorCode::MissingField.category(), "Descriptor");
        assert_eq!(ErrorCode::CommandNotFound.category(), "Process");
    }

    #[test]
    fn test_missing_fields_lists_everything() {
        let err = Error::missing_fields(&["package", "zim_file"], &["app_name", "package", "zim_file"]);
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("package, zim_file"));
        assert!(err.suggestion.unwrap().contains("app_name"));
    }

    #[test]
    fn test_artifact_missing_with_context() {
        let err = Error::artifact_missing("lzma", "/tmp/platforms/x86/lib/liblzma.a")
            .with_context("arch x86");

        assert_eq!(err.code, ErrorCode::ArtifactMissing);
        assert!(err.to_string().contains("liblzma.a"));
        assert!(err.to_string().contains("Context: arch x86"));
    }
}
