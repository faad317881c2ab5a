//! Durable install/delete staging.
//!
//! Install and delete requests never touch the plugins directory in the
//! process that makes them. They are written into the loader's persisted
//! state first and applied once, early at the next startup, before the
//! scan. That makes registry rebuilding all-or-nothing: either a restart
//! sees the new world, or nothing changed.
//!
//! Applying an operation always clears its pending entry, success or
//! not; a permanently broken operation surfaces one operator dialog
//! instead of a retry storm.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{ConfigStore, InstallKind, PendingDelete, PendingInstall};
use crate::paths::LoaderPaths;
use crate::shim::HostShim;

use super::error::{ExtensionError, ExtensionResult};
use super::manifest::{PluginManifest, MANIFEST_FILE};
use super::registry::Registry;

/// Staging and replay of pending install/delete operations.
#[derive(Clone)]
pub struct PendingQueue {
    paths: LoaderPaths,
    store: ConfigStore,
    shim: Arc<dyn HostShim>,
}

impl PendingQueue {
    pub fn new(paths: LoaderPaths, store: ConfigStore, shim: Arc<dyn HostShim>) -> Self {
        Self { paths, store, shim }
    }

    /// Stage an install from `source`: a zip archive containing a
    /// top-level `manifest.json`, or a bare `manifest.json` whose
    /// directory gets copied. With `cancel`, unstage instead.
    ///
    /// Staging over a slug that is already installed stages a delete of
    /// the old copy first, so the pair resolves as an upgrade at the
    /// next startup. Returns `false` (persisted state untouched) when
    /// the source is not an installable plugin.
    pub fn stage_install(&self, registry: &Registry, source: &Path, cancel: bool) -> bool {
        let (slug, kind) = match sniff_install_source(source) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::error!(source = %source.display(), error = %e, "install staging rejected");
                return false;
            }
        };

        if !cancel && registry.contains(&slug) {
            self.stage_delete(registry, &slug, false, false);
        }

        let mut state = self.store.loader_state();
        if cancel {
            state.installing_plugins.remove(&slug);
        } else {
            state.installing_plugins.insert(
                slug.clone(),
                PendingInstall {
                    plugin_path: source.to_path_buf(),
                    plugin_type: kind,
                },
            );
        }
        self.store.save_loader_state(&state)
    }

    /// Stage a delete for `slug`, optionally including its private data
    /// directory. With `cancel`, unstage instead. Unknown slugs are a
    /// no-op success.
    pub fn stage_delete(
        &self,
        registry: &Registry,
        slug: &str,
        delete_data: bool,
        cancel: bool,
    ) -> bool {
        let Some(record) = registry.get(slug) else {
            return true;
        };

        let mut state = self.store.loader_state();
        if cancel {
            state.deleting_plugins.remove(slug);
        } else {
            state.deleting_plugins.insert(
                slug.to_string(),
                PendingDelete {
                    plugin_path: record.plugin_dir.clone(),
                    data_path: delete_data.then(|| record.data_dir.clone()),
                },
            );
        }
        self.store.save_loader_state(&state)
    }

    /// Drain and apply all pending operations. Runs once at startup,
    /// before the scan: all deletes first, then all installs, so an
    /// upgrade staged as delete-then-install of the same slug resolves
    /// without duplication.
    pub fn apply_pending(&self) {
        let mut state = self.store.loader_state();

        let deletes: Vec<String> = state.deleting_plugins.keys().cloned().collect();
        for slug in deletes {
            if let Some(op) = state.deleting_plugins.remove(&slug) {
                if let Err(e) = apply_delete(&op) {
                    tracing::error!(slug, error = %e, "pending delete failed");
                    self.shim.show_error_dialog(
                        "Failed to delete plugin, please remove it manually",
                        &format!("{slug}: {e}"),
                    );
                }
            }
            // Entry cleared whether the delete succeeded or not.
            self.store.save_loader_state(&state);
        }

        let installs: Vec<String> = state.installing_plugins.keys().cloned().collect();
        for slug in installs {
            if let Some(op) = state.installing_plugins.remove(&slug) {
                if let Err(e) = apply_install(&self.paths, &slug, &op) {
                    tracing::error!(slug, error = %e, "pending install failed");
                    self.shim.show_error_dialog(
                        "Failed to install plugin, please install it manually",
                        &format!("{slug}: {e}"),
                    );
                }
            }
            self.store.save_loader_state(&state);
        }
    }
}

/// Work out what `source` installs: `(slug, kind)`.
fn sniff_install_source(source: &Path) -> ExtensionResult<(String, InstallKind)> {
    if !source.is_file() {
        return Err(ExtensionError::NotInstallable(source.to_path_buf()));
    }

    let is_zip = source
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        let mut archive = zip::ZipArchive::new(fs::File::open(source)?)?;
        let mut entry = archive.by_name(MANIFEST_FILE).map_err(|_| {
            ExtensionError::NotInstallable(source.to_path_buf())
        })?;
        let mut contents = String::new();
        entry.read_to_string(&mut contents)?;
        let manifest = parse_source_manifest(source, &contents)?;
        return Ok((manifest.slug, InstallKind::Zip));
    }

    if source.file_name().is_some_and(|n| n == MANIFEST_FILE) {
        let contents = fs::read_to_string(source)?;
        let manifest = parse_source_manifest(source, &contents)?;
        return Ok((manifest.slug, InstallKind::Json));
    }

    Err(ExtensionError::NotInstallable(source.to_path_buf()))
}

fn parse_source_manifest(source: &Path, contents: &str) -> ExtensionResult<PluginManifest> {
    PluginManifest::parse(contents).map_err(|message| ExtensionError::ManifestInvalid {
        path: source.to_path_buf(),
        message,
    })
}

fn apply_delete(op: &PendingDelete) -> ExtensionResult<()> {
    if let Some(data_path) = &op.data_path {
        if data_path.exists() {
            fs::remove_dir_all(data_path)?;
        }
    }
    if op.plugin_path.exists() {
        fs::remove_dir_all(&op.plugin_path)?;
    }
    Ok(())
}

fn apply_install(paths: &LoaderPaths, slug: &str, op: &PendingInstall) -> ExtensionResult<()> {
    let dest = paths.plugin_dir(slug);

    // Never overwrite an existing copy: a partial failure must not
    // destroy the working one. Rename it aside instead.
    if dest.exists() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64 % 100_000)
            .unwrap_or(0);
        let aside = dest.with_file_name(format!("{slug}_{suffix}"));
        fs::rename(&dest, &aside)?;
    }

    match op.plugin_type {
        InstallKind::Zip => {
            let mut archive = zip::ZipArchive::new(fs::File::open(&op.plugin_path)?)?;
            fs::create_dir_all(&dest)?;
            archive.extract(&dest)?;
        }
        InstallKind::Json => {
            let src_dir = op.plugin_path.parent().ok_or_else(|| {
                ExtensionError::NotInstallable(op.plugin_path.clone())
            })?;
            copy_dir_recursive(src_dir, &dest)?;
        }
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| Path::new(""));
        let target: PathBuf = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
