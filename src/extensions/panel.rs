//! Presentation-context plugin manager.
//!
//! Owns the renderer injection pass and the per-plugin export tables it
//! produces, then broadcasts lifecycle hooks into them. A plugin that
//! faulted in any earlier pass gets an error entry instead of an export
//! table: the settings window shows an error view for that plugin alone
//! and every other plugin stays fully functional.

use std::collections::BTreeMap;
use std::collections::HashMap;

use super::error::Fault;
use super::injector::{run_injection_pass, InjectKind, InjectOutcome};
use super::registry::{PluginRecord, Registry};
use super::runtime::{PluginHooks, ScriptRuntime};
use super::Slug;

/// Opaque identifier of one plugin's settings tab.
pub type PanelId = usize;

/// Settings-window surface the loader drives. Rendering belongs to the
/// host UI; the loader only decides what each plugin's tab shows.
pub trait SettingsInterface {
    /// Register a tab for a plugin and return its id.
    fn add_panel(&mut self, record: &PluginRecord) -> PanelId;

    /// Replace a tab's content with an error view for `slug`.
    fn render_error(&mut self, panel: PanelId, slug: &str, fault: &Fault);
}

enum PanelEntry {
    Ready(Box<dyn PluginHooks>),
    Faulted(Fault),
}

/// Per-plugin presentation state, in registration order.
pub struct PanelManager {
    entries: Vec<(Slug, PanelEntry)>,
}

impl PanelManager {
    /// Run the renderer pass and collect export tables.
    ///
    /// `prior_faults` carries the main and preload passes' fault
    /// records; a plugin present there (or already faulted on its
    /// record) never runs its renderer file and is registered as
    /// faulted instead.
    pub fn load(
        registry: &Registry,
        order: &[Slug],
        runtime: &mut dyn ScriptRuntime,
        prior_faults: &BTreeMap<Slug, Fault>,
    ) -> Self {
        let report = run_injection_pass(registry, order, InjectKind::Renderer, runtime, prior_faults);
        let mut hooks: HashMap<Slug, Box<dyn PluginHooks>> = report.exports.into_iter().collect();

        let mut entries = Vec::new();
        for slug in order {
            let Some(record) = registry.get(slug) else {
                continue;
            };
            if record.disabled || record.incompatible {
                continue;
            }

            let earlier_fault = record
                .error
                .clone()
                .or_else(|| prior_faults.get(slug).cloned());
            if let Some(fault) = earlier_fault {
                entries.push((slug.clone(), PanelEntry::Faulted(fault)));
                continue;
            }

            match report.outcomes.get(slug) {
                Some(InjectOutcome::Faulted(fault)) => {
                    entries.push((slug.clone(), PanelEntry::Faulted(fault.clone())));
                }
                Some(InjectOutcome::Loaded) => {
                    if let Some(h) = hooks.remove(slug) {
                        entries.push((slug.clone(), PanelEntry::Ready(h)));
                    }
                }
                _ => {}
            }
        }

        Self { entries }
    }

    /// Slugs with an export table or a fault entry, in registration
    /// order.
    pub fn slugs(&self) -> impl Iterator<Item = &Slug> {
        self.entries.iter().map(|(slug, _)| slug)
    }

    /// Fault registered for `slug`, if any.
    pub fn fault(&self, slug: &str) -> Option<&Fault> {
        self.entries.iter().find_map(|(s, entry)| match entry {
            PanelEntry::Faulted(fault) if s == slug => Some(fault),
            _ => None,
        })
    }

    /// Broadcast the settings-window hook.
    ///
    /// Every registered plugin gets a tab. Faulted plugins get an error
    /// view; a hook that itself faults turns only its own tab into an
    /// error view and dispatch continues.
    pub fn on_setting_window_created(
        &mut self,
        registry: &Registry,
        ui: &mut dyn SettingsInterface,
    ) {
        for (slug, entry) in &mut self.entries {
            let Some(record) = registry.get(slug) else {
                continue;
            };
            let panel = ui.add_panel(record);
            match entry {
                PanelEntry::Faulted(fault) => ui.render_error(panel, slug, fault),
                PanelEntry::Ready(hooks) => {
                    if let Err(fault) = hooks.on_setting_window_created(ui, panel) {
                        tracing::warn!(slug = %slug, fault = %fault, "settings hook faulted");
                        ui.render_error(panel, slug, &fault);
                    }
                }
            }
        }
    }

    /// Broadcast a component-mount event to every loaded plugin.
    pub fn on_component_mount(&mut self, component: &str) {
        for (slug, entry) in &mut self.entries {
            if let PanelEntry::Ready(hooks) = entry {
                if let Err(fault) = hooks.on_component_mount(component) {
                    tracing::warn!(slug = %slug, fault = %fault, "mount hook faulted");
                }
            }
        }
    }

    /// Broadcast a component-unmount event to every loaded plugin.
    pub fn on_component_unmount(&mut self, component: &str) {
        for (slug, entry) in &mut self.entries {
            if let PanelEntry::Ready(hooks) = entry {
                if let Err(fault) = hooks.on_component_unmount(component) {
                    tracing::warn!(slug = %slug, fault = %fault, "unmount hook faulted");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderState;
    use crate::extensions::registry::build_registry;
    use crate::extensions::resolver::topological_order;
    use crate::paths::LoaderPaths;
    use crate::shim::LogShim;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    type CallLog = Rc<RefCell<Vec<String>>>;

    struct LoggingHooks {
        slug: String,
        log: CallLog,
        fail_settings: bool,
    }

    impl PluginHooks for LoggingHooks {
        fn on_setting_window_created(
            &mut self,
            _ui: &mut dyn SettingsInterface,
            _panel: PanelId,
        ) -> Result<(), Fault> {
            self.log.borrow_mut().push(format!("settings:{}", self.slug));
            if self.fail_settings {
                Err(Fault::new("hook exploded"))
            } else {
                Ok(())
            }
        }

        fn on_component_mount(&mut self, component: &str) -> Result<(), Fault> {
            self.log
                .borrow_mut()
                .push(format!("mount:{}:{}", self.slug, component));
            Ok(())
        }
    }

    /// Runtime producing LoggingHooks; sources containing "throw" fault.
    struct HookRuntime {
        log: CallLog,
    }

    impl ScriptRuntime for HookRuntime {
        fn execute(
            &mut self,
            slug: &str,
            source: &str,
        ) -> Result<Option<Box<dyn PluginHooks>>, Fault> {
            if source.contains("throw") {
                return Err(Fault::new("boom"));
            }
            Ok(Some(Box::new(LoggingHooks {
                slug: slug.to_string(),
                log: self.log.clone(),
                fail_settings: source.contains("fail-settings"),
            })))
        }
    }

    #[derive(Default)]
    struct RecordingSettings {
        panels: Vec<String>,
        errors: Vec<(String, String)>,
    }

    impl SettingsInterface for RecordingSettings {
        fn add_panel(&mut self, record: &PluginRecord) -> PanelId {
            self.panels.push(record.manifest.slug.clone());
            self.panels.len() - 1
        }

        fn render_error(&mut self, _panel: PanelId, slug: &str, fault: &Fault) {
            self.errors.push((slug.to_string(), fault.message.clone()));
        }
    }

    fn write_plugin(paths: &LoaderPaths, slug: &str, renderer_body: &str) {
        let dir = paths.plugin_dir(slug);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("manifest.json"),
            format!(
                r#"{{"slug":"{slug}","name":"{slug}","manifest_version":4,"injects":{{"renderer":"renderer.js"}}}}"#
            ),
        )
        .unwrap();
        std::fs::write(dir.join("renderer.js"), renderer_body).unwrap();
    }

    fn load_manager(
        paths: &LoaderPaths,
        prior_faults: &BTreeMap<Slug, Fault>,
        log: &CallLog,
    ) -> (Registry, PanelManager) {
        let registry = build_registry(paths, &LoaderState::default(), "linux", &LogShim);
        let order = topological_order(&registry);
        let mut runtime = HookRuntime { log: log.clone() };
        let manager = PanelManager::load(&registry, &order, &mut runtime, prior_faults);
        (registry, manager)
    }

    #[test]
    fn test_privileged_fault_shadows_renderer_file() {
        let temp = tempdir().unwrap();
        let paths = LoaderPaths::new(temp.path().join("root"), temp.path());
        write_plugin(&paths, "p", "// perfectly fine renderer");
        write_plugin(&paths, "q", "// loads");

        let mut prior = BTreeMap::new();
        prior.insert("p".to_string(), Fault::new("[Main] boom"));

        let log: CallLog = Rc::new(RefCell::new(Vec::new()));
        let (registry, mut manager) = load_manager(&paths, &prior, &log);

        assert_eq!(manager.fault("p").unwrap().message, "[Main] boom");
        assert!(manager.fault("q").is_none());

        let mut ui = RecordingSettings::default();
        manager.on_setting_window_created(&registry, &mut ui);

        assert_eq!(ui.panels, vec!["p", "q"]);
        assert_eq!(ui.errors.len(), 1);
        assert_eq!(ui.errors[0].0, "p");
        assert!(ui.errors[0].1.contains("boom"));
        // q's hook still ran.
        assert!(log.borrow().contains(&"settings:q".to_string()));
    }

    #[test]
    fn test_hook_fault_scoped_to_one_tab() {
        let temp = tempdir().unwrap();
        let paths = LoaderPaths::new(temp.path().join("root"), temp.path());
        write_plugin(&paths, "a", "// fail-settings");
        write_plugin(&paths, "b", "// fine");

        let log: CallLog = Rc::new(RefCell::new(Vec::new()));
        let (registry, mut manager) = load_manager(&paths, &BTreeMap::new(), &log);

        let mut ui = RecordingSettings::default();
        manager.on_setting_window_created(&registry, &mut ui);

        assert_eq!(ui.errors, vec![("a".to_string(), "hook exploded".to_string())]);
        assert!(log.borrow().contains(&"settings:b".to_string()));
    }

    #[test]
    fn test_renderer_fault_becomes_error_entry() {
        let temp = tempdir().unwrap();
        let paths = LoaderPaths::new(temp.path().join("root"), temp.path());
        write_plugin(&paths, "bad", "throw");

        let log: CallLog = Rc::new(RefCell::new(Vec::new()));
        let (_registry, manager) = load_manager(&paths, &BTreeMap::new(), &log);

        assert_eq!(manager.fault("bad").unwrap().message, "[Renderer] boom");
    }

    #[test]
    fn test_mount_broadcast_reaches_all_loaded() {
        let temp = tempdir().unwrap();
        let paths = LoaderPaths::new(temp.path().join("root"), temp.path());
        write_plugin(&paths, "a", "// fine");
        write_plugin(&paths, "b", "// fine");

        let log: CallLog = Rc::new(RefCell::new(Vec::new()));
        let (_registry, mut manager) = load_manager(&paths, &BTreeMap::new(), &log);

        manager.on_component_mount("sidebar");
        let calls = log.borrow();
        assert!(calls.contains(&"mount:a:sidebar".to_string()));
        assert!(calls.contains(&"mount:b:sidebar".to_string()));
    }
}
