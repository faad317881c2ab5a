//! Persisted configuration documents.
//!
//! Every plugin (and the loader itself) gets one JSON document at
//! `data/<slug>/config.json`. Documents are always read and written
//! whole; there is no field-level persistence. Two writers racing is
//! last-write-wins, which is acceptable because writes come from
//! discrete user actions.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Slug under which the loader persists its own state document.
pub const LOADER_SLUG: &str = "scion";

/// Whole-document JSON store keyed by plugin slug.
///
/// `get` merges the persisted document over caller-supplied defaults;
/// `set` persists verbatim. Neither ever panics on I/O faults: `get`
/// falls back to the defaults and `set` reports `false`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    data_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn document_path(&self, slug: &str) -> PathBuf {
        self.data_dir.join(slug).join("config.json")
    }

    /// Read the document for `slug`, overlaying persisted keys onto
    /// `defaults`. On first read the defaults are persisted as the
    /// initial document. Unreadable or unparsable documents resolve to
    /// the defaults without touching disk.
    pub fn get(&self, slug: &str, defaults: &Value) -> Value {
        let path = self.document_path(slug);
        if !path.exists() {
            self.set(slug, defaults);
            return defaults.clone();
        }
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Value>(&contents) {
                Ok(persisted) => merge_over_defaults(defaults, persisted),
                Err(e) => {
                    tracing::warn!(slug, error = %e, "unparsable config document, using defaults");
                    defaults.clone()
                }
            },
            Err(e) => {
                tracing::warn!(slug, error = %e, "unreadable config document, using defaults");
                defaults.clone()
            }
        }
    }

    /// Persist `document` verbatim for `slug`, creating parent
    /// directories as needed. Returns `false` on any I/O fault.
    pub fn set(&self, slug: &str, document: &Value) -> bool {
        let path = self.document_path(slug);
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::error!(slug, error = %e, "failed to create config directory");
                return false;
            }
        }
        let contents = match serde_json::to_string_pretty(document) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(slug, error = %e, "failed to serialize config document");
                return false;
            }
        };
        match fs::write(&path, contents) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(slug, error = %e, "failed to write config document");
                false
            }
        }
    }

    /// Load the loader's own state document, filling absent fields from
    /// defaults.
    pub fn loader_state(&self) -> LoaderState {
        let defaults = serde_json::to_value(LoaderState::default())
            .unwrap_or_else(|_| Value::Object(Default::default()));
        serde_json::from_value(self.get(LOADER_SLUG, &defaults)).unwrap_or_default()
    }

    /// Persist the loader's state document.
    pub fn save_loader_state(&self, state: &LoaderState) -> bool {
        match serde_json::to_value(state) {
            Ok(doc) => self.set(LOADER_SLUG, &doc),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize loader state");
                false
            }
        }
    }
}

/// Shallow merge: persisted keys win, defaults fill the gaps.
///
/// Non-object documents pass through as persisted.
fn merge_over_defaults(defaults: &Value, persisted: Value) -> Value {
    match (defaults, persisted) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged = base.clone();
            for (k, v) in over {
                merged.insert(k, v);
            }
            Value::Object(merged)
        }
        (_, persisted) => persisted,
    }
}

/// The loader's persisted state document.
///
/// `installing_plugins` / `deleting_plugins` are the durable staging
/// areas drained once at the next startup; a slug appears at most once
/// in each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderState {
    /// Master switch: when false, no scan or injection happens (pending
    /// operations still drain).
    pub enable_plugins: bool,

    /// Slugs the user disabled; survives restarts.
    pub disabled_plugins: Vec<String>,

    /// Pending installs keyed by slug.
    pub installing_plugins: BTreeMap<String, PendingInstall>,

    /// Pending deletes keyed by slug.
    pub deleting_plugins: BTreeMap<String, PendingDelete>,
}

impl Default for LoaderState {
    fn default() -> Self {
        Self {
            enable_plugins: true,
            disabled_plugins: Vec::new(),
            installing_plugins: BTreeMap::new(),
            deleting_plugins: BTreeMap::new(),
        }
    }
}

impl LoaderState {
    pub fn is_disabled(&self, slug: &str) -> bool {
        self.disabled_plugins.iter().any(|s| s == slug)
    }

    /// Idempotent add to the disabled list.
    pub fn disable(&mut self, slug: &str) {
        if !self.is_disabled(slug) {
            self.disabled_plugins.push(slug.to_string());
        }
    }

    /// Idempotent remove from the disabled list.
    pub fn enable(&mut self, slug: &str) {
        self.disabled_plugins.retain(|s| s != slug);
    }
}

/// A staged install operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingInstall {
    /// Source the install is applied from: a zip archive or a
    /// `manifest.json` whose directory gets copied.
    pub plugin_path: PathBuf,
    pub plugin_type: InstallKind,
}

/// How a staged install source is materialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstallKind {
    /// Extract the archive into `plugins/<slug>/`.
    Zip,
    /// Copy the manifest's containing directory into `plugins/<slug>/`.
    Json,
}

/// A staged delete operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingDelete {
    /// Installed plugin directory to remove.
    pub plugin_path: PathBuf,

    /// Private data directory to remove as well, when requested.
    pub data_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_get_persists_defaults_on_first_read() {
        let temp = tempdir().unwrap();
        let store = ConfigStore::new(temp.path());

        let defaults = json!({"theme": "dark", "count": 3});
        let doc = store.get("demo", &defaults);
        assert_eq!(doc, defaults);

        // Document now exists on disk.
        let on_disk = std::fs::read_to_string(temp.path().join("demo/config.json")).unwrap();
        let parsed: Value = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(parsed, defaults);
    }

    #[test]
    fn test_persisted_keys_win_over_defaults() {
        let temp = tempdir().unwrap();
        let store = ConfigStore::new(temp.path());

        store.set("demo", &json!({"theme": "light"}));
        let doc = store.get("demo", &json!({"theme": "dark", "count": 3}));
        assert_eq!(doc, json!({"theme": "light", "count": 3}));
    }

    #[test]
    fn test_unparsable_document_resolves_to_defaults() {
        let temp = tempdir().unwrap();
        let store = ConfigStore::new(temp.path());

        let path = temp.path().join("demo");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("config.json"), "{not json").unwrap();

        let defaults = json!({"a": 1});
        assert_eq!(store.get("demo", &defaults), defaults);
    }

    #[test]
    fn test_set_reports_false_on_io_fault() {
        let store = ConfigStore::new("/dev/null/not-a-directory");
        assert!(!store.set("demo", &json!({})));
    }

    #[test]
    fn test_loader_state_round_trip() {
        let temp = tempdir().unwrap();
        let store = ConfigStore::new(temp.path());

        let mut state = store.loader_state();
        assert!(state.enable_plugins);
        assert!(state.disabled_plugins.is_empty());

        state.disable("demo");
        state.disable("demo");
        state.installing_plugins.insert(
            "demo".into(),
            PendingInstall {
                plugin_path: PathBuf::from("/tmp/demo.zip"),
                plugin_type: InstallKind::Zip,
            },
        );
        assert!(store.save_loader_state(&state));

        let reloaded = store.loader_state();
        assert_eq!(reloaded.disabled_plugins, vec!["demo".to_string()]);
        assert_eq!(
            reloaded.installing_plugins.get("demo").unwrap().plugin_type,
            InstallKind::Zip
        );

        let mut state = reloaded;
        state.enable("demo");
        state.enable("demo");
        assert!(state.disabled_plugins.is_empty());
    }

    #[test]
    fn test_absent_fields_fill_from_defaults() {
        let temp = tempdir().unwrap();
        let store = ConfigStore::new(temp.path());

        // A document written by an older version, missing most fields.
        store.set(LOADER_SLUG, &json!({"disabled_plugins": ["x"]}));

        let state = store.loader_state();
        assert!(state.enable_plugins);
        assert_eq!(state.disabled_plugins, vec!["x".to_string()]);
        assert!(state.installing_plugins.is_empty());
    }
}
