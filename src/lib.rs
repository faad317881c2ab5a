//! Scion - plugin loading and isolation core.
//!
//! Scion grafts a plugin system onto a closed host application. It
//! discovers plugins from manifest files, stages installs and deletes
//! durably so they apply at the next startup, orders plugins by their
//! declared dependencies, and injects their entry files into two
//! execution contexts with per-plugin fault isolation. Plugin code
//! reaches privileged operations only through a token-gated capability
//! bridge.
//!
//! # Architecture
//!
//! - [`paths`] - Profile directory layout and host metadata
//! - [`config`] - Whole-document JSON config persistence
//! - [`shim`] - Host integration seam (dialogs, external opens)
//! - [`extensions`] - Scan, registry, ordering, injection, bridge
//! - [`loader`] - Startup orchestration over all of the above
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use scion::{HostVersions, Loader, LoaderPaths};
//!
//! let paths = LoaderPaths::discover("/opt/host");
//! let loader = Loader::new(paths, HostVersions::new("9.9.9", "1.0"), shim);
//!
//! let registry = loader.bootstrap();
//! let order = loader.injection_order(&registry);
//! let faults = loader.run_privileged(&registry, &order, &mut main_runtime);
//! let panels = loader.load_presentation(
//!     &registry, &order, &mut preload_runtime, &mut renderer_runtime, &faults,
//! );
//! ```

pub mod config;
pub mod extensions;
pub mod loader;
pub mod paths;
pub mod shim;

pub use config::{ConfigStore, InstallKind, LoaderState, PendingDelete, PendingInstall};
pub use extensions::{
    BridgeTransport, CapabilityBroker, CapabilityToken, Fault, HostEndpoint, PanelBridge,
    PanelManager, PendingQueue, PluginHooks, PluginManifest, PluginRecord, Registry,
    ScriptRuntime, SettingsInterface, Slug,
};
pub use loader::Loader;
pub use paths::{current_platform, HostVersions, LoaderPaths};
pub use shim::{AlertQueue, BufferedShim, HostShim, LogShim};
