//! Loader directory layout and host metadata.
//!
//! Everything the loader touches on disk lives under a single profile
//! directory: `plugins/` holds one subdirectory per installed plugin,
//! `data/` holds per-plugin private data (including persisted config
//! documents). The profile location can be overridden with the
//! `SCION_PROFILE` environment variable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the profile directory.
pub const PROFILE_ENV: &str = "SCION_PROFILE";

/// Directory layout used by every loader component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderPaths {
    /// Installation root of the loader itself.
    pub root: PathBuf,

    /// Profile directory holding all mutable state.
    pub profile: PathBuf,

    /// Per-plugin private data directories (`data/<slug>/`).
    pub data: PathBuf,

    /// Installed plugin directories (`plugins/<slug>/`).
    pub plugins: PathBuf,
}

impl LoaderPaths {
    /// Build the layout from explicit root and profile directories.
    pub fn new(root: impl Into<PathBuf>, profile: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let profile = profile.into();
        Self {
            data: profile.join("data"),
            plugins: profile.join("plugins"),
            root,
            profile,
        }
    }

    /// Resolve the profile directory: `SCION_PROFILE` if set, otherwise
    /// the platform data directory, otherwise the loader root itself.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let profile = std::env::var_os(PROFILE_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join("scion")))
            .unwrap_or_else(|| root.clone());
        Self::new(root, profile)
    }

    /// Private data directory for one plugin.
    pub fn plugin_data_dir(&self, slug: &str) -> PathBuf {
        self.data.join(slug)
    }

    /// Installed directory for one plugin.
    pub fn plugin_dir(&self, slug: &str) -> PathBuf {
        self.plugins.join(slug)
    }
}

/// Version metadata exposed to plugins over the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostVersions {
    /// Version of the host application the loader is grafted onto.
    pub host: String,

    /// Version of the loader itself.
    pub loader: String,

    /// Version of the execution runtime embedded by the host.
    pub runtime: String,
}

impl HostVersions {
    pub fn new(host: impl Into<String>, runtime: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            loader: env!("CARGO_PKG_VERSION").to_string(),
            runtime: runtime.into(),
        }
    }
}

/// Platform identifier in the vocabulary plugin manifests use.
///
/// Manifests declare `platform` lists with the host runtime's names
/// (`win32`, `darwin`, `linux`), not Rust's.
pub fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        other => other,
    }
}

/// True when `path` sits under `base` (component-wise prefix).
pub(crate) fn is_under(path: &Path, base: &Path) -> bool {
    path.starts_with(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_derived_from_profile() {
        let paths = LoaderPaths::new("/opt/scion", "/home/u/.scion");
        assert_eq!(paths.data, PathBuf::from("/home/u/.scion/data"));
        assert_eq!(paths.plugins, PathBuf::from("/home/u/.scion/plugins"));
        assert_eq!(paths.plugin_dir("demo"), PathBuf::from("/home/u/.scion/plugins/demo"));
        assert_eq!(paths.plugin_data_dir("demo"), PathBuf::from("/home/u/.scion/data/demo"));
    }

    #[test]
    fn test_current_platform_is_manifest_vocabulary() {
        let p = current_platform();
        assert!(["linux", "darwin", "win32"].contains(&p) || !p.is_empty());
    }

    #[test]
    fn test_loader_version_comes_from_package() {
        let v = HostVersions::new("9.9.9", "1.0");
        assert_eq!(v.loader, env!("CARGO_PKG_VERSION"));
        assert_eq!(v.host, "9.9.9");
    }
}
