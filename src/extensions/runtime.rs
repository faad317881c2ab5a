//! Plugin execution interface.
//!
//! The loader does not embed a script engine. Each execution context
//! (privileged, presentation) supplies a [`ScriptRuntime`]: it receives
//! an entry file's source text and either runs it to completion,
//! returning the plugin's export table, or reports a [`Fault`]. The
//! runtime is constructed with its fixed capability environment (a
//! bridge handle and its token) and must expose nothing wider to the
//! code it runs — plugins cannot widen their own surface.

use super::error::Fault;
use super::panel::{PanelId, SettingsInterface};

/// Executes one plugin entry file inside a context.
///
/// Implementations map engine throws (or load failures of any kind)
/// into `Err(Fault)`; they never panic across this boundary. `Ok(None)`
/// means the file ran for its side effects and exported nothing, the
/// normal case for `main` and `preload` files.
pub trait ScriptRuntime {
    fn execute(
        &mut self,
        slug: &str,
        source: &str,
    ) -> Result<Option<Box<dyn PluginHooks>>, Fault>;
}

/// Export table of a presentation-context plugin.
///
/// All hooks are optional; defaults do nothing. A hook reporting a
/// fault only affects its own plugin's view — dispatch continues with
/// the next plugin.
pub trait PluginHooks {
    /// Invoked once when the settings window opens; `panel` is the tab
    /// already registered for this plugin.
    fn on_setting_window_created(
        &mut self,
        ui: &mut dyn SettingsInterface,
        panel: PanelId,
    ) -> Result<(), Fault> {
        let _ = (ui, panel);
        Ok(())
    }

    /// Invoked when a host UI component mounts.
    fn on_component_mount(&mut self, component: &str) -> Result<(), Fault> {
        let _ = component;
        Ok(())
    }

    /// Invoked when a host UI component unmounts.
    fn on_component_unmount(&mut self, component: &str) -> Result<(), Fault> {
        let _ = component;
        Ok(())
    }
}

/// Runtime that executes nothing and exports nothing.
///
/// Stands in for a context that has no engine attached (headless hosts,
/// tests).
#[derive(Debug, Default)]
pub struct InertRuntime;

impl ScriptRuntime for InertRuntime {
    fn execute(
        &mut self,
        _slug: &str,
        _source: &str,
    ) -> Result<Option<Box<dyn PluginHooks>>, Fault> {
        Ok(None)
    }
}
