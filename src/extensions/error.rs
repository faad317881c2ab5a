//! Error types for the plugin subsystem.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while scanning, staging, or loading plugins.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Manifest not found in plugin directory: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid manifest in {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("Source is not an installable plugin: {0}")]
    NotInstallable(PathBuf),

    #[error("Plugin '{0}' not found in registry")]
    PluginNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Result type for plugin operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;

/// A captured error record attached to a plugin instead of being thrown.
///
/// Once a fault is recorded against a slug, that plugin's remaining
/// lifecycle in the current process is over; faults never propagate
/// across plugin boundaries or past the loader's own frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: String::new(),
        }
    }

    pub fn with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: stack.into(),
        }
    }

    /// Tag the message with the context it was captured in, e.g.
    /// `[Renderer] boom`.
    pub fn tagged(context: &str, source: Fault) -> Self {
        Self {
            message: format!("[{}] {}", context, source.message),
            stack: source.stack,
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
