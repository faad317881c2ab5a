//! Capability bridge between plugin code and the privileged loader.
//!
//! Presentation-context code never touches the loader directly. It holds
//! a [`CapabilityToken`] issued at injection time and calls through a
//! [`BridgeTransport`]; the privileged side validates the token on every
//! request and dispatches to [`HostApi`]. Tokens are issued only for
//! origins inside the loader's own directories, and a request carrying
//! anything else resolves to `Null` — never an error the caller could
//! mine for host internals.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ConfigStore;
use crate::paths::{is_under, HostVersions, LoaderPaths};
use crate::shim::HostShim;

use super::queue::PendingQueue;
use super::registry::Registry;

/// Unforgeable proof that a caller was granted bridge access.
///
/// The id is private and only [`CapabilityBroker::issue`] creates one;
/// plugin code can pass a token along but cannot mint or widen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityToken(u64);

/// Issues and validates capability tokens.
///
/// The allow-list is fixed at construction: the loader root, the profile
/// directory, and the plugin/data trees under it. An origin path is
/// canonicalized before the check so a symlink pointing outside the
/// tree does not qualify.
pub struct CapabilityBroker {
    allowed: Vec<PathBuf>,
    issued: Mutex<BTreeSet<u64>>,
    next_id: AtomicU64,
}

impl CapabilityBroker {
    pub fn new(paths: &LoaderPaths) -> Self {
        let allowed = [&paths.root, &paths.profile, &paths.data, &paths.plugins]
            .into_iter()
            .map(|dir| std::fs::canonicalize(dir).unwrap_or_else(|_| dir.clone()))
            .collect();
        Self {
            allowed,
            issued: Mutex::new(BTreeSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Issue a token for code loaded from `origin`, or `None` when the
    /// origin is outside every allowed directory.
    pub fn issue(&self, origin: &Path) -> Option<CapabilityToken> {
        let origin = std::fs::canonicalize(origin).unwrap_or_else(|_| origin.to_path_buf());
        if !self.allowed.iter().any(|base| is_under(&origin, base)) {
            tracing::warn!(origin = %origin.display(), "bridge token refused");
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.issued
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id);
        Some(CapabilityToken(id))
    }

    /// True when `token` was issued by this broker.
    pub fn is_valid(&self, token: &CapabilityToken) -> bool {
        self.issued
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&token.0)
    }
}

/// Privileged operations reachable over the bridge.
pub struct HostApi {
    paths: LoaderPaths,
    versions: HostVersions,
    platform: String,
    store: ConfigStore,
    queue: PendingQueue,
    registry: Arc<Registry>,
    shim: Arc<dyn HostShim>,
}

impl HostApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        paths: LoaderPaths,
        versions: HostVersions,
        platform: impl Into<String>,
        store: ConfigStore,
        queue: PendingQueue,
        registry: Arc<Registry>,
        shim: Arc<dyn HostShim>,
    ) -> Self {
        Self {
            paths,
            versions,
            platform: platform.into(),
            store,
            queue,
            registry,
            shim,
        }
    }

    pub fn config_get(&self, slug: &str, defaults: &Value) -> Value {
        self.store.get(slug, defaults)
    }

    pub fn config_set(&self, slug: &str, document: &Value) -> bool {
        self.store.set(slug, document)
    }

    pub fn plugin_install(&self, source: &Path, cancel: bool) -> bool {
        self.queue.stage_install(&self.registry, source, cancel)
    }

    pub fn plugin_delete(&self, slug: &str, delete_data: bool, cancel: bool) -> bool {
        self.queue.stage_delete(&self.registry, slug, delete_data, cancel)
    }

    /// Flip the persisted disabled flag; takes effect at the next
    /// restart, like everything else that changes the registry.
    pub fn plugin_disable(&self, slug: &str, undone: bool) -> bool {
        let mut state = self.store.loader_state();
        if undone {
            state.enable(slug);
        } else {
            state.disable(slug);
        }
        self.store.save_loader_state(&state)
    }

    pub fn open_external(&self, url: &str) -> std::io::Result<()> {
        self.shim.open_external(url)
    }

    pub fn open_path(&self, path: &Path) -> std::io::Result<()> {
        self.shim.open_path(path)
    }

    /// Immutable world-view handed to presentation code at connect time.
    pub fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            paths: self.paths.clone(),
            versions: self.versions.clone(),
            platform: self.platform.clone(),
            plugins: (*self.registry).clone(),
        }
    }
}

/// Plain-data view of the loader handed across the bridge. Carries no
/// live handles: anything mutating goes through a [`BridgeRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSnapshot {
    pub paths: LoaderPaths,
    pub versions: HostVersions,
    pub platform: String,
    pub plugins: Registry,
}

/// One bridge call: a namespace, a method, and JSON arguments.
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    pub token: CapabilityToken,
    pub name: String,
    pub method: String,
    pub args: Vec<Value>,
}

impl BridgeRequest {
    pub fn new(
        token: CapabilityToken,
        name: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            token,
            name: name.into(),
            method: method.into(),
            args,
        }
    }
}

/// Carries bridge requests from a context to the privileged side.
///
/// Any fault — invalid token, unknown method, bad arguments, handler
/// failure — resolves to `Value::Null`.
pub trait BridgeTransport: Send + Sync {
    fn invoke(&self, request: BridgeRequest) -> Value;
}

/// The privileged end of the bridge.
pub struct HostEndpoint {
    api: HostApi,
    broker: CapabilityBroker,
}

impl HostEndpoint {
    pub fn new(api: HostApi, broker: CapabilityBroker) -> Self {
        Self { api, broker }
    }

    pub fn broker(&self) -> &CapabilityBroker {
        &self.broker
    }

    fn dispatch(&self, request: &BridgeRequest) -> Option<Value> {
        let arg_str = |i: usize| request.args.get(i).and_then(Value::as_str);
        let arg_bool = |i: usize| request.args.get(i).and_then(Value::as_bool);

        match (request.name.as_str(), request.method.as_str()) {
            ("config", "get") => {
                let slug = arg_str(0)?;
                let defaults = request.args.get(1).cloned().unwrap_or_else(|| json!({}));
                Some(self.api.config_get(slug, &defaults))
            }
            ("config", "set") => {
                let slug = arg_str(0)?;
                let document = request.args.get(1)?;
                Some(Value::Bool(self.api.config_set(slug, document)))
            }
            ("plugins", "install") => {
                let source = PathBuf::from(arg_str(0)?);
                let cancel = arg_bool(1).unwrap_or(false);
                Some(Value::Bool(self.api.plugin_install(&source, cancel)))
            }
            ("plugins", "delete") => {
                let slug = arg_str(0)?;
                let delete_data = arg_bool(1).unwrap_or(false);
                let cancel = arg_bool(2).unwrap_or(false);
                Some(Value::Bool(self.api.plugin_delete(slug, delete_data, cancel)))
            }
            ("plugins", "disable") => {
                let slug = arg_str(0)?;
                let undone = arg_bool(1).unwrap_or(false);
                Some(Value::Bool(self.api.plugin_disable(slug, undone)))
            }
            ("host", "openExternal") => {
                let url = arg_str(0)?;
                self.api.open_external(url).ok()?;
                Some(Value::Bool(true))
            }
            ("host", "openPath") => {
                let path = PathBuf::from(arg_str(0)?);
                self.api.open_path(&path).ok()?;
                Some(Value::Bool(true))
            }
            ("host", "snapshot") => serde_json::to_value(self.api.snapshot()).ok(),
            _ => {
                tracing::warn!(
                    name = %request.name,
                    method = %request.method,
                    "unknown bridge method"
                );
                None
            }
        }
    }
}

impl BridgeTransport for HostEndpoint {
    fn invoke(&self, request: BridgeRequest) -> Value {
        if !self.broker.is_valid(&request.token) {
            tracing::warn!(name = %request.name, method = %request.method, "bridge call with invalid token");
            return Value::Null;
        }
        self.dispatch(&request).unwrap_or(Value::Null)
    }
}

/// Presentation-side face of the bridge.
///
/// Holds the context's token and a plain-data snapshot fetched at
/// connect time; every mutating call goes back through the transport.
pub struct PanelBridge {
    transport: Arc<dyn BridgeTransport>,
    token: CapabilityToken,
    snapshot: BridgeSnapshot,
}

impl PanelBridge {
    /// Fetch the snapshot and wire up the proxy. `None` when the token
    /// is not honored by the other side.
    pub fn connect(transport: Arc<dyn BridgeTransport>, token: CapabilityToken) -> Option<Self> {
        let raw = transport.invoke(BridgeRequest::new(
            token.clone(),
            "host",
            "snapshot",
            Vec::new(),
        ));
        let snapshot = serde_json::from_value(raw).ok()?;
        Some(Self {
            transport,
            token,
            snapshot,
        })
    }

    pub fn snapshot(&self) -> &BridgeSnapshot {
        &self.snapshot
    }

    fn call(&self, name: &str, method: &str, args: Vec<Value>) -> Value {
        self.transport
            .invoke(BridgeRequest::new(self.token.clone(), name, method, args))
    }

    fn call_bool(&self, name: &str, method: &str, args: Vec<Value>) -> bool {
        self.call(name, method, args).as_bool().unwrap_or(false)
    }

    pub fn config_get(&self, slug: &str, defaults: &Value) -> Value {
        let doc = self.call("config", "get", vec![json!(slug), defaults.clone()]);
        if doc.is_null() {
            defaults.clone()
        } else {
            doc
        }
    }

    pub fn config_set(&self, slug: &str, document: &Value) -> bool {
        self.call_bool("config", "set", vec![json!(slug), document.clone()])
    }

    pub fn install(&self, source: &Path, cancel: bool) -> bool {
        self.call_bool(
            "plugins",
            "install",
            vec![json!(source.to_string_lossy()), json!(cancel)],
        )
    }

    pub fn delete(&self, slug: &str, delete_data: bool, cancel: bool) -> bool {
        self.call_bool(
            "plugins",
            "delete",
            vec![json!(slug), json!(delete_data), json!(cancel)],
        )
    }

    pub fn disable(&self, slug: &str, undone: bool) -> bool {
        self.call_bool("plugins", "disable", vec![json!(slug), json!(undone)])
    }

    pub fn open_external(&self, url: &str) -> bool {
        self.call_bool("host", "openExternal", vec![json!(url)])
    }

    pub fn open_path(&self, path: &Path) -> bool {
        self.call_bool("host", "openPath", vec![json!(path.to_string_lossy())])
    }
}
