//! Error types for xpromo-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xpromo-core
#[derive(Error, Debug)]
pub enum Error {
    /// A listing-click link was requested for a post that is not in the
    /// known-posts mapping.
    #[error("xpromo listing click link requested with invalid post id: {0}")]
    InvalidReference(String),

    /// Storage errors surfaced outside the storage gate (opening a store file)
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::InvalidReference(post_id) => Some(
                Remediation::new(format!(
                    "Post {post_id} is not present in the session state; refresh the listing before building the link."
                ))
                .alternative("Pass a post id taken from the current session's posts map."),
            ),
            Self::Storage(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the store and state file paths exist and are readable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .command("Validate JSON", "python -m json.tool < state.json")
                    .alternative("Check for trailing commas or invalid UTF-8."),
            ),
        }
    }
}

/// Failures raised by a key/value store backend.
///
/// These never escape the storage gate: the gate normalizes every variant to
/// "storage unavailable".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage is disabled in this environment")]
    Disabled,

    #[error("storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("storage access denied: {0}")]
    SecurityDenied(String),

    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("store file is corrupt: {details}")]
    Corruption { details: String },
}

impl StorageError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Disabled => Remediation::new(
                "Storage is disabled. Dismissal state cannot be persisted; the interstitial stays suppressed.",
            )
            .alternative("Run with --store pointing at a writable file."),
            Self::QuotaExceeded { .. } => {
                Remediation::new("The store ran out of space. Free space or move the store file.")
                    .command("Check disk usage", "df -h")
            }
            Self::SecurityDenied(_) => {
                Remediation::new("Access to the store was denied. Check file permissions.")
                    .alternative("Ensure the store file is owned by the current user.")
            }
            Self::Backend(_) => Remediation::new("The store backend failed. Retry the command.")
                .alternative("Point --store at a different path."),
            Self::Corruption { .. } => {
                Remediation::new("The store file is not valid JSON. Delete it to reset dismissal state.")
                    .command("Inspect store", "cat \"$XPROMO_STORE\"")
            }
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Config file not found: {path}. Verify the path and retry."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative("Pass --config with the correct path."),
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check permissions."
            ))
            .command("Check permissions", format!("ls -l \"{path}\""))
            .alternative("Ensure the file is readable by the current user."),
            Self::ParseFailed(_) => {
                Remediation::new("Config parse failed. Fix the TOML syntax and retry.")
                    .alternative("Compare against the defaults printed by `xpromo config`.")
            }
            Self::SerializeFailed(_) => {
                Remediation::new("Failed to serialize configuration. Check config values.")
                    .alternative("Recreate the config from known-good defaults.")
            }
            Self::ValidationError(_) => {
                Remediation::new("Config validation failed. Fix the invalid fields and retry.")
                    .alternative("Review the [links] section of xpromo.toml.")
            }
        }
    }
}

/// Format an error with remediation guidance for display.
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        output.push('\n');
        output.push('\n');
        output.push_str(&remediation.render_plain());
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_available_for_error_variants() {
        let json_err = serde_json::from_str::<serde_json::Value>("").unwrap_err();
        let errors = vec![
            Error::InvalidReference("t3_missing".to_string()),
            Error::Storage(StorageError::Disabled),
            Error::Storage(StorageError::QuotaExceeded {
                key: "bannerLastClosed".to_string(),
            }),
            Error::Storage(StorageError::SecurityDenied("private mode".to_string())),
            Error::Storage(StorageError::Backend("boom".to_string())),
            Error::Storage(StorageError::Corruption {
                details: "eof".to_string(),
            }),
            Error::Config(ConfigError::FileNotFound("xpromo.toml".to_string())),
            Error::Config(ConfigError::ReadFailed(
                "xpromo.toml".to_string(),
                "denied".to_string(),
            )),
            Error::Config(ConfigError::ParseFailed("bad".to_string())),
            Error::Config(ConfigError::SerializeFailed("bad".to_string())),
            Error::Config(ConfigError::ValidationError("host".to_string())),
            Error::Io(std::io::Error::other("io")),
            Error::Json(json_err),
        ];

        for err in errors {
            let remediation = err.remediation();
            assert!(remediation.is_some(), "missing remediation for {err}");
            assert!(!remediation.unwrap().summary.is_empty());
        }
    }

    #[test]
    fn invalid_reference_names_the_post() {
        let err = Error::InvalidReference("t3_abc".to_string());
        assert_eq!(
            err.to_string(),
            "xpromo listing click link requested with invalid post id: t3_abc"
        );
    }

    #[test]
    fn format_error_includes_remediation_block() {
        let err = Error::Config(ConfigError::FileNotFound("/tmp/x.toml".to_string()));
        let rendered = format_error_with_remediation(&err);
        assert!(rendered.starts_with("Error: Config error: Config file not found"));
        assert!(rendered.contains("To fix:"));
        assert!(rendered.contains("Check path"));
    }
}
