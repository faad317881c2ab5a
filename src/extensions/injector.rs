//! Context injection passes.
//!
//! Both execution contexts run the same state machine over the registry
//! in resolver order: skip ineligible plugins, skip plugins with no
//! entry file for this context, otherwise fetch the file and execute it
//! through the context's runtime. An execution fault is captured
//! against that plugin alone — the loop over the remaining plugins is
//! never aborted.
//!
//! Passes are strictly sequential within a context (later plugins may
//! depend on global side effects of earlier ones) and strictly ordered
//! across contexts: every `main` file finishes, faults included, before
//! any presentation-context file starts. Later passes receive the
//! earlier passes' faults and treat a faulted plugin as already
//! terminal.

use std::collections::BTreeMap;

use super::error::Fault;
use super::registry::{PluginRecord, Registry};
use super::runtime::{PluginHooks, ScriptRuntime};
use super::Slug;

/// Which entry file a pass injects, and under which context tag faults
/// are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectKind {
    /// Privileged-context entry (`injects.main`).
    Main,
    /// Presentation-context bridge setup (`injects.preload`).
    Preload,
    /// Presentation-context entry (`injects.renderer`).
    Renderer,
}

impl InjectKind {
    /// Tag used in fault messages, e.g. `[Renderer] boom`.
    pub fn tag(self) -> &'static str {
        match self {
            InjectKind::Main => "Main",
            InjectKind::Preload => "Preload",
            InjectKind::Renderer => "Renderer",
        }
    }

    fn entry_file<'a>(self, record: &'a PluginRecord) -> Option<&'a std::path::Path> {
        match self {
            InjectKind::Main => record.injects.main.as_deref(),
            InjectKind::Preload => record.injects.preload.as_deref(),
            InjectKind::Renderer => record.injects.renderer.as_deref(),
        }
    }
}

/// Terminal outcome of one plugin in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectOutcome {
    /// Disabled, incompatible, or already faulted in an earlier pass.
    Skipped,
    /// No entry file for this context; a no-op.
    NoFile,
    /// Entry file executed to completion.
    Loaded,
    /// Entry file (or its fetch) faulted; recorded, not thrown.
    Faulted(Fault),
}

/// Result of one injection pass.
pub struct InjectionReport {
    pub kind: InjectKind,
    pub outcomes: BTreeMap<Slug, InjectOutcome>,
    /// Export tables of loaded plugins, in injection order.
    pub exports: Vec<(Slug, Box<dyn PluginHooks>)>,
}

impl InjectionReport {
    /// Faults this pass captured, keyed by slug.
    pub fn faults(&self) -> BTreeMap<Slug, Fault> {
        self.outcomes
            .iter()
            .filter_map(|(slug, outcome)| match outcome {
                InjectOutcome::Faulted(fault) => Some((slug.clone(), fault.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Merge fault maps from earlier passes for consultation by a later one.
pub fn merge_faults(
    mut base: BTreeMap<Slug, Fault>,
    extra: BTreeMap<Slug, Fault>,
) -> BTreeMap<Slug, Fault> {
    for (slug, fault) in extra {
        base.entry(slug).or_insert(fault);
    }
    base
}

/// Run one injection pass over `order`.
///
/// `prior_faults` are fault records from earlier passes (and any
/// load-time record errors are consulted via the registry); a plugin
/// present there is skipped without touching its entry file.
pub fn run_injection_pass(
    registry: &Registry,
    order: &[Slug],
    kind: InjectKind,
    runtime: &mut dyn ScriptRuntime,
    prior_faults: &BTreeMap<Slug, Fault>,
) -> InjectionReport {
    let mut report = InjectionReport {
        kind,
        outcomes: BTreeMap::new(),
        exports: Vec::new(),
    };

    for slug in order {
        let Some(record) = registry.get(slug) else {
            continue;
        };

        if !record.eligible() || prior_faults.contains_key(slug) {
            report.outcomes.insert(slug.clone(), InjectOutcome::Skipped);
            continue;
        }

        let Some(entry) = kind.entry_file(record) else {
            report.outcomes.insert(slug.clone(), InjectOutcome::NoFile);
            continue;
        };

        let outcome = match std::fs::read_to_string(entry) {
            Ok(source) => match runtime.execute(slug, &source) {
                Ok(exports) => {
                    if let Some(hooks) = exports {
                        report.exports.push((slug.clone(), hooks));
                    }
                    InjectOutcome::Loaded
                }
                Err(fault) => InjectOutcome::Faulted(Fault::tagged(kind.tag(), fault)),
            },
            Err(e) => InjectOutcome::Faulted(Fault::tagged(kind.tag(), Fault::new(e.to_string()))),
        };

        if let InjectOutcome::Faulted(fault) = &outcome {
            tracing::warn!(slug, context = kind.tag(), fault = %fault, "plugin injection faulted");
        }
        report.outcomes.insert(slug.clone(), outcome);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderState;
    use crate::extensions::registry::build_registry;
    use crate::extensions::resolver::topological_order;
    use crate::paths::LoaderPaths;
    use crate::shim::LogShim;
    use tempfile::tempdir;

    /// Runtime scripted per-slug: sources containing "throw" fault,
    /// everything else loads. Records execution order.
    #[derive(Default)]
    struct ScriptedRuntime {
        ran: Vec<String>,
    }

    impl ScriptRuntime for ScriptedRuntime {
        fn execute(
            &mut self,
            slug: &str,
            source: &str,
        ) -> Result<Option<Box<dyn PluginHooks>>, Fault> {
            self.ran.push(slug.to_string());
            if source.contains("throw") {
                Err(Fault::with_stack("boom", "at entry"))
            } else {
                Ok(None)
            }
        }
    }

    fn write_plugin(paths: &LoaderPaths, slug: &str, main_body: Option<&str>, deps: &[&str]) {
        let dir = paths.plugin_dir(slug);
        std::fs::create_dir_all(&dir).unwrap();
        let deps_json = deps
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(",");
        let injects = if main_body.is_some() {
            r#","injects":{"main":"main.js"}"#
        } else {
            ""
        };
        std::fs::write(
            dir.join("manifest.json"),
            format!(
                r#"{{"slug":"{slug}","name":"{slug}","manifest_version":4,"dependencies":[{deps_json}]{injects}}}"#
            ),
        )
        .unwrap();
        if let Some(body) = main_body {
            std::fs::write(dir.join("main.js"), body).unwrap();
        }
    }

    fn build(paths: &LoaderPaths, state: &LoaderState) -> (Registry, Vec<Slug>) {
        let registry = build_registry(paths, state, "linux", &LogShim);
        let order = topological_order(&registry);
        (registry, order)
    }

    #[test]
    fn test_pass_runs_in_dependency_order() {
        let temp = tempdir().unwrap();
        let paths = LoaderPaths::new(temp.path().join("root"), temp.path());
        write_plugin(&paths, "app", Some("// app"), &["lib"]);
        write_plugin(&paths, "lib", Some("// lib"), &[]);

        let (registry, order) = build(&paths, &LoaderState::default());
        let mut runtime = ScriptedRuntime::default();
        let report = run_injection_pass(
            &registry,
            &order,
            InjectKind::Main,
            &mut runtime,
            &BTreeMap::new(),
        );

        assert_eq!(runtime.ran, vec!["lib", "app"]);
        assert_eq!(report.outcomes["app"], InjectOutcome::Loaded);
    }

    #[test]
    fn test_fault_contained_to_one_plugin() {
        let temp = tempdir().unwrap();
        let paths = LoaderPaths::new(temp.path().join("root"), temp.path());
        write_plugin(&paths, "bad", Some("throw"), &[]);
        write_plugin(&paths, "good", Some("// fine"), &[]);

        let (registry, order) = build(&paths, &LoaderState::default());
        let mut runtime = ScriptedRuntime::default();
        let report = run_injection_pass(
            &registry,
            &order,
            InjectKind::Main,
            &mut runtime,
            &BTreeMap::new(),
        );

        // Loop did not abort: both plugins were attempted.
        assert_eq!(runtime.ran, vec!["bad", "good"]);
        match &report.outcomes["bad"] {
            InjectOutcome::Faulted(fault) => {
                assert_eq!(fault.message, "[Main] boom");
                assert_eq!(fault.stack, "at entry");
            }
            other => panic!("expected fault, got {other:?}"),
        }
        assert_eq!(report.outcomes["good"], InjectOutcome::Loaded);
        assert_eq!(report.faults().len(), 1);
    }

    #[test]
    fn test_prior_faults_skip_without_executing() {
        let temp = tempdir().unwrap();
        let paths = LoaderPaths::new(temp.path().join("root"), temp.path());
        write_plugin(&paths, "p", Some("// fine"), &[]);

        let (registry, order) = build(&paths, &LoaderState::default());
        let mut prior = BTreeMap::new();
        prior.insert("p".to_string(), Fault::new("[Main] boom"));

        let mut runtime = ScriptedRuntime::default();
        let report = run_injection_pass(
            &registry,
            &order,
            InjectKind::Renderer,
            &mut runtime,
            &prior,
        );

        assert!(runtime.ran.is_empty(), "faulted plugin must not run again");
        assert_eq!(report.outcomes["p"], InjectOutcome::Skipped);
    }

    #[test]
    fn test_disabled_and_missing_file_outcomes() {
        let temp = tempdir().unwrap();
        let paths = LoaderPaths::new(temp.path().join("root"), temp.path());
        write_plugin(&paths, "off", Some("// never"), &[]);
        write_plugin(&paths, "nofile", None, &[]);

        let mut state = LoaderState::default();
        state.disable("off");

        let (registry, order) = build(&paths, &state);
        let mut runtime = ScriptedRuntime::default();
        let report = run_injection_pass(
            &registry,
            &order,
            InjectKind::Main,
            &mut runtime,
            &BTreeMap::new(),
        );

        assert!(runtime.ran.is_empty());
        assert_eq!(report.outcomes["off"], InjectOutcome::Skipped);
        assert_eq!(report.outcomes["nofile"], InjectOutcome::NoFile);
    }

    #[test]
    fn test_merge_faults_keeps_earliest() {
        let mut a = BTreeMap::new();
        a.insert("p".to_string(), Fault::new("[Main] first"));
        let mut b = BTreeMap::new();
        b.insert("p".to_string(), Fault::new("[Preload] second"));
        b.insert("q".to_string(), Fault::new("[Preload] other"));

        let merged = merge_faults(a, b);
        assert_eq!(merged["p"].message, "[Main] first");
        assert_eq!(merged["q"].message, "[Preload] other");
    }
}
