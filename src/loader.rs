//! Startup orchestration.
//!
//! [`Loader`] owns the pieces every startup needs and runs them in the
//! fixed order: drain the pending install/delete queue, scan and build
//! the registry, compute dependency order, then drive the injection
//! passes. The host keeps the returned registry behind an `Arc` and
//! passes it explicitly to whatever needs it; there is no process-wide
//! plugin state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ConfigStore;
use crate::extensions::{
    build_registry, merge_faults, run_injection_pass, topological_order, CapabilityBroker, Fault,
    HostApi, HostEndpoint, InjectKind, PanelManager, PendingQueue, Registry, ScriptRuntime, Slug,
};
use crate::paths::{current_platform, HostVersions, LoaderPaths};
use crate::shim::HostShim;

/// Top-level handle over the plugin subsystem.
pub struct Loader {
    paths: LoaderPaths,
    versions: HostVersions,
    platform: String,
    store: ConfigStore,
    shim: Arc<dyn HostShim>,
}

impl Loader {
    /// Wire up a loader for the current platform.
    pub fn new(paths: LoaderPaths, versions: HostVersions, shim: Arc<dyn HostShim>) -> Self {
        Self::with_platform(paths, versions, shim, current_platform())
    }

    /// Same, with an explicit platform identifier (`linux`/`darwin`/
    /// `win32`).
    pub fn with_platform(
        paths: LoaderPaths,
        versions: HostVersions,
        shim: Arc<dyn HostShim>,
        platform: impl Into<String>,
    ) -> Self {
        let store = ConfigStore::new(paths.data.clone());
        Self {
            paths,
            versions,
            platform: platform.into(),
            store,
            shim,
        }
    }

    pub fn paths(&self) -> &LoaderPaths {
        &self.paths
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn queue(&self) -> PendingQueue {
        PendingQueue::new(self.paths.clone(), self.store.clone(), self.shim.clone())
    }

    /// Drain pending operations, then scan and build the registry.
    ///
    /// When the master switch is off the queue still drains (staged
    /// operations must not pile up across disabled runs) but the scan is
    /// skipped and the registry comes back empty.
    pub fn bootstrap(&self) -> Arc<Registry> {
        self.queue().apply_pending();

        let state = self.store.loader_state();
        if !state.enable_plugins {
            tracing::info!("plugin loading disabled, skipping scan");
            return Arc::new(Registry::default());
        }

        let registry = build_registry(&self.paths, &state, &self.platform, self.shim.as_ref());
        tracing::info!(plugins = registry.len(), "registry built");
        Arc::new(registry)
    }

    /// Dependency-first injection order for `registry`.
    pub fn injection_order(&self, registry: &Registry) -> Vec<Slug> {
        topological_order(registry)
    }

    /// Run the privileged pass. Returns its fault records for the
    /// presentation passes to consult.
    pub fn run_privileged(
        &self,
        registry: &Registry,
        order: &[Slug],
        runtime: &mut dyn ScriptRuntime,
    ) -> BTreeMap<Slug, Fault> {
        run_injection_pass(registry, order, InjectKind::Main, runtime, &BTreeMap::new()).faults()
    }

    /// Run the presentation passes: preload first, then renderer.
    ///
    /// Both consult `privileged_faults`; a plugin that faulted in any
    /// earlier pass is terminal and never executes again.
    pub fn load_presentation(
        &self,
        registry: &Registry,
        order: &[Slug],
        preload_runtime: &mut dyn ScriptRuntime,
        renderer_runtime: &mut dyn ScriptRuntime,
        privileged_faults: &BTreeMap<Slug, Fault>,
    ) -> PanelManager {
        let preload = run_injection_pass(
            registry,
            order,
            InjectKind::Preload,
            preload_runtime,
            privileged_faults,
        );
        let faults = merge_faults(privileged_faults.clone(), preload.faults());
        PanelManager::load(registry, order, renderer_runtime, &faults)
    }

    /// Build the privileged bridge endpoint over `registry`.
    pub fn endpoint(&self, registry: Arc<Registry>) -> HostEndpoint {
        let api = HostApi::new(
            self.paths.clone(),
            self.versions.clone(),
            self.platform.clone(),
            self.store.clone(),
            self.queue(),
            registry,
            self.shim.clone(),
        );
        HostEndpoint::new(api, CapabilityBroker::new(&self.paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shim::RecordingShim;
    use tempfile::tempdir;

    fn loader(profile: &std::path::Path) -> Loader {
        Loader::with_platform(
            LoaderPaths::new(profile.join("root"), profile),
            HostVersions::new("1.2.3", "1.0"),
            Arc::new(RecordingShim::default()),
            "linux",
        )
    }

    fn write_plugin(paths: &LoaderPaths, slug: &str) {
        let dir = paths.plugin_dir(slug);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("manifest.json"),
            format!(r#"{{"slug":"{slug}","name":"{slug}","manifest_version":4}}"#),
        )
        .unwrap();
    }

    #[test]
    fn test_bootstrap_builds_registry_from_scan() {
        let temp = tempdir().unwrap();
        let loader = loader(temp.path());
        write_plugin(loader.paths(), "a");
        write_plugin(loader.paths(), "b");

        let registry = loader.bootstrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(loader.injection_order(&registry), vec!["a", "b"]);
    }

    #[test]
    fn test_master_switch_skips_scan_but_not_queue() {
        let temp = tempdir().unwrap();
        let loader = loader(temp.path());
        write_plugin(loader.paths(), "a");

        let mut state = loader.store().loader_state();
        state.enable_plugins = false;
        // A stale delete of a directory that exists: must still drain.
        state.deleting_plugins.insert(
            "a".into(),
            crate::config::PendingDelete {
                plugin_path: loader.paths().plugin_dir("a"),
                data_path: None,
            },
        );
        loader.store().save_loader_state(&state);

        let registry = loader.bootstrap();
        assert!(registry.is_empty());
        assert!(!loader.paths().plugin_dir("a").exists(), "queue drained");
        assert!(loader.store().loader_state().deleting_plugins.is_empty());
    }
}
