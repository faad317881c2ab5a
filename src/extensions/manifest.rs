//! Plugin manifest parsing and directory scanning.
//!
//! Each installed plugin ships a `manifest.json` in its directory root:
//!
//! ```json
//! {
//!   "slug": "my-plugin",
//!   "name": "My Plugin",
//!   "manifest_version": 4,
//!   "platform": ["linux", "darwin"],
//!   "dependencies": ["other-plugin"],
//!   "injects": { "main": "main.js", "renderer": "renderer.js" },
//!   "thumb": "icon.png"
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shim::HostShim;

use super::error::{ExtensionError, ExtensionResult};

/// Manifest schema version this loader understands. Plugins declaring
/// any other value are invisible to the scan.
pub const MANIFEST_VERSION: u32 = 4;

/// Manifest file name inside a plugin directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Declarative descriptor shipped with each plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique identifier, stable across versions; the registry key.
    pub slug: String,

    /// Human-readable display name.
    pub name: String,

    /// Manifest schema version; must equal [`MANIFEST_VERSION`].
    pub manifest_version: u32,

    /// Supported platform identifiers (`linux`/`darwin`/`win32`).
    /// Absent — or anything that is not a list — means compatible with
    /// every platform.
    #[serde(default, deserialize_with = "platform_list")]
    pub platform: Option<Vec<String>>,

    /// Slugs this plugin depends on; dependencies load first.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Context-specific entry files, relative to the plugin directory.
    #[serde(default)]
    pub injects: InjectsConfig,

    /// Icon path relative to the plugin directory.
    #[serde(default)]
    pub thumb: Option<String>,
}

/// Entry files per execution context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjectsConfig {
    /// Privileged-context entry file.
    #[serde(default)]
    pub main: Option<String>,

    /// Bridge-setup file, run in the presentation context before any
    /// renderer file.
    #[serde(default)]
    pub preload: Option<String>,

    /// Presentation-context entry file.
    #[serde(default)]
    pub renderer: Option<String>,
}

/// A `platform` value that is not a list degrades to `None` (universal)
/// instead of failing the whole manifest.
fn platform_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(D::Error::custom),
        _ => Ok(None),
    }
}

impl PluginManifest {
    /// Load and parse `manifest.json` from a plugin directory.
    pub fn load(plugin_dir: &Path) -> ExtensionResult<Self> {
        let manifest_path = plugin_dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(ExtensionError::ManifestNotFound(plugin_dir.to_path_buf()));
        }
        let contents = std::fs::read_to_string(&manifest_path)?;
        Self::parse(&contents).map_err(|message| ExtensionError::ManifestInvalid {
            path: manifest_path,
            message,
        })
    }

    /// Parse manifest JSON, enforcing the required fields.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let manifest: Self = serde_json::from_str(contents).map_err(|e| e.to_string())?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), String> {
        if self.slug.is_empty() {
            return Err("slug is required".to_string());
        }
        if self.name.is_empty() {
            return Err("name is required".to_string());
        }
        Ok(())
    }
}

/// One scan hit: where the plugin lives and what it declared.
#[derive(Debug, Clone)]
pub struct ScannedPlugin {
    pub dir: PathBuf,
    pub manifest: PluginManifest,
}

/// Enumerate immediate subdirectories of the plugins root and parse a
/// manifest from each.
///
/// Unreadable, manifest-less, malformed, or wrong-version entries are
/// skipped without aborting the scan. Only a root-level failure (the
/// directory cannot be created or read) is surfaced to the operator,
/// and even then the caller proceeds with zero plugins.
pub fn scan_plugins(plugins_root: &Path, shim: &dyn HostShim) -> Vec<ScannedPlugin> {
    let mut found = Vec::new();

    let entries = match std::fs::create_dir_all(plugins_root)
        .and_then(|()| std::fs::read_dir(plugins_root))
    {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(root = %plugins_root.display(), error = %e, "plugin scan failed");
            shim.show_error_dialog(
                "Failed to read the plugins directory",
                &format!("{}: {}", plugins_root.display(), e),
            );
            return found;
        }
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        match PluginManifest::load(&dir) {
            Ok(manifest) if manifest.manifest_version == MANIFEST_VERSION => {
                tracing::info!(slug = %manifest.slug, name = %manifest.name, "found plugin");
                found.push(ScannedPlugin { dir, manifest });
            }
            Ok(manifest) => {
                tracing::debug!(
                    slug = %manifest.slug,
                    version = manifest.manifest_version,
                    "skipping plugin with unsupported manifest version"
                );
            }
            Err(ExtensionError::ManifestNotFound(_)) => {
                // Not a plugin directory.
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable plugin");
            }
        }
    }

    found
}
