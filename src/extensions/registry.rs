//! Plugin registry: the slug-keyed map every other component reads.
//!
//! The registry is built once at startup, after the pending-operation
//! queue drains, and is read-only for the rest of the process. Installs
//! and deletes staged later only take effect at the next restart, which
//! keeps injection free of live-mutation races.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::LoaderState;
use crate::paths::LoaderPaths;
use crate::shim::HostShim;

use super::error::Fault;
use super::manifest::{scan_plugins, InjectsConfig, PluginManifest};
use super::Slug;

/// Resolved absolute paths of a plugin's entry files. `None` means the
/// manifest did not name a file, or named one that does not exist or is
/// not a regular file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjectPaths {
    pub main: Option<PathBuf>,
    pub preload: Option<PathBuf>,
    pub renderer: Option<PathBuf>,
}

impl InjectPaths {
    fn resolve(plugin_dir: &Path, injects: &InjectsConfig) -> Self {
        let resolve_one = |rel: &Option<String>| -> Option<PathBuf> {
            let file = plugin_dir.join(rel.as_deref()?);
            // Must exist and be a regular file, not a directory.
            if file.is_file() {
                Some(file)
            } else {
                None
            }
        };
        Self {
            main: resolve_one(&injects.main),
            preload: resolve_one(&injects.preload),
            renderer: resolve_one(&injects.renderer),
        }
    }
}

/// Everything the loader knows about one discovered plugin.
///
/// Records are rebuilt wholesale on every startup scan; only the
/// `disabled` flag and the pending-operation queue persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRecord {
    pub manifest: PluginManifest,

    /// Declared platform list exists and the current platform is not in
    /// it. An absent list means universally compatible.
    pub incompatible: bool,

    /// The user disabled this slug (persisted).
    pub disabled: bool,

    /// Load-time fault, if any; terminal for this plugin's lifecycle.
    pub error: Option<Fault>,

    /// Installed plugin directory.
    pub plugin_dir: PathBuf,

    /// Private data directory (`data/<slug>/`).
    pub data_dir: PathBuf,

    /// Resolved entry files.
    pub injects: InjectPaths,
}

impl PluginRecord {
    fn derive(
        paths: &LoaderPaths,
        state: &LoaderState,
        platform: &str,
        dir: PathBuf,
        manifest: PluginManifest,
    ) -> Self {
        let incompatible = manifest
            .platform
            .as_ref()
            .map(|list| !list.iter().any(|p| p == platform))
            .unwrap_or(false);
        Self {
            incompatible,
            disabled: state.is_disabled(&manifest.slug),
            error: None,
            injects: InjectPaths::resolve(&dir, &manifest.injects),
            data_dir: paths.plugin_data_dir(&manifest.slug),
            plugin_dir: dir,
            manifest,
        }
    }

    /// A plugin is eligible for injection unless it is disabled,
    /// platform-incompatible, or already faulted.
    pub fn eligible(&self) -> bool {
        !self.disabled && !self.incompatible && self.error.is_none()
    }
}

/// Slug-keyed map of discovered plugins. Built once, then read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    records: std::collections::BTreeMap<Slug, PluginRecord>,
}

impl Registry {
    pub fn get(&self, slug: &str) -> Option<&PluginRecord> {
        self.records.get(slug)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.records.contains_key(slug)
    }

    /// All slugs in deterministic (sorted) order.
    pub fn slugs(&self) -> impl Iterator<Item = &Slug> {
        self.records.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Slug, &PluginRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the registry with fault records attached to their slugs.
    ///
    /// The registry built at startup never mutates; once the injection
    /// passes have run, the host derives this annotated copy so the
    /// bridge snapshot shows which plugins faulted. An already-recorded
    /// fault wins over a later one.
    pub fn with_faults(&self, faults: &BTreeMap<Slug, Fault>) -> Registry {
        let mut records = self.records.clone();
        for (slug, fault) in faults {
            if let Some(record) = records.get_mut(slug) {
                record.error.get_or_insert_with(|| fault.clone());
            }
        }
        Registry { records }
    }
}

/// Scan the plugins root and build the registry.
///
/// Computes per-record eligibility flags, resolves inject paths, and
/// reports one missing-dependency notice per dependency slug that no
/// scanned manifest provides. A missing dependency does not disable the
/// plugin that declared it.
pub fn build_registry(
    paths: &LoaderPaths,
    state: &LoaderState,
    platform: &str,
    shim: &dyn HostShim,
) -> Registry {
    let mut registry = Registry::default();
    let mut declared_deps: BTreeSet<Slug> = BTreeSet::new();

    for scanned in scan_plugins(&paths.plugins, shim) {
        let manifest = scanned.manifest;
        declared_deps.extend(manifest.dependencies.iter().cloned());

        let slug = manifest.slug.clone();
        let record = PluginRecord::derive(paths, state, platform, scanned.dir, manifest);
        if registry.records.insert(slug.clone(), record).is_some() {
            // Duplicate slug across directories: last scanned wins.
            tracing::warn!(slug, "duplicate plugin slug, keeping the last one scanned");
        }
    }

    for missing in declared_deps
        .iter()
        .filter(|slug| !registry.contains(slug))
    {
        tracing::warn!(slug = %missing, "missing plugin dependency");
        shim.show_error_dialog("Missing plugin dependency", missing);
    }

    registry
}
