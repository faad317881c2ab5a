//! Plugin loading and isolation core.
//!
//! The pipeline runs once per startup, in this order:
//!
//! 1. [`queue`] drains the durable install/delete staging areas.
//! 2. [`manifest`] scans `plugins/` for `manifest.json` files.
//! 3. [`registry`] turns the scan into the slug-keyed [`Registry`],
//!    flagging disabled and platform-incompatible plugins.
//! 4. [`resolver`] orders slugs so dependencies inject first.
//! 5. [`injector`] runs the privileged pass, then the presentation
//!    passes, each through a [`ScriptRuntime`]; faults are recorded per
//!    plugin, never propagated.
//! 6. [`panel`] holds the presentation export tables and broadcasts
//!    lifecycle hooks.
//!
//! [`bridge`] is the only channel back from plugin code to privileged
//! operations, gated by capability tokens.

pub mod bridge;
pub mod error;
pub mod injector;
pub mod manifest;
pub mod panel;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod runtime;

/// Plugin identifier: the manifest's `slug`, unique per installation.
pub type Slug = String;

pub use bridge::{
    BridgeRequest, BridgeSnapshot, BridgeTransport, CapabilityBroker, CapabilityToken,
    HostApi, HostEndpoint, PanelBridge,
};
pub use error::{ExtensionError, ExtensionResult, Fault};
pub use injector::{merge_faults, run_injection_pass, InjectKind, InjectOutcome, InjectionReport};
pub use manifest::{scan_plugins, InjectsConfig, PluginManifest, ScannedPlugin, MANIFEST_VERSION};
pub use panel::{PanelId, PanelManager, SettingsInterface};
pub use queue::PendingQueue;
pub use registry::{build_registry, InjectPaths, PluginRecord, Registry};
pub use resolver::topological_order;
pub use runtime::{InertRuntime, PluginHooks, ScriptRuntime};
