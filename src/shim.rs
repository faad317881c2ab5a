//! Host integration seam.
//!
//! The loader grafts onto a closed host application it must not modify.
//! Everything it needs from the host goes through [`HostShim`], which the
//! embedding side implements and registers explicitly; the loader never
//! reaches into host internals.

use std::path::Path;
use std::sync::Mutex;

/// Operations the host provides to the loader.
///
/// Error dialogs may be requested before the host's window system is up;
/// implementations are expected to defer them until ready (see
/// [`AlertQueue`]).
pub trait HostShim: Send + Sync {
    /// Surface an operator-visible error dialog.
    fn show_error_dialog(&self, title: &str, message: &str);

    /// Open a URL with the system handler.
    fn open_external(&self, url: &str) -> std::io::Result<()>;

    /// Open a file or directory with the system handler.
    fn open_path(&self, path: &Path) -> std::io::Result<()>;
}

/// Buffers alerts raised before the host is ready and flushes them, in
/// order, once it is.
#[derive(Debug, Default)]
pub struct AlertQueue {
    inner: Mutex<AlertQueueInner>,
}

#[derive(Debug, Default)]
struct AlertQueueInner {
    ready: bool,
    pending: Vec<(String, String)>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an alert, or deliver it immediately when already ready.
    pub fn push(&self, title: &str, message: &str, deliver: impl Fn(&str, &str)) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.ready {
            deliver(title, message);
        } else {
            inner.pending.push((title.to_string(), message.to_string()));
        }
    }

    /// Mark the host ready and flush everything queued so far.
    pub fn mark_ready(&self, deliver: impl Fn(&str, &str)) {
        let drained = {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            inner.ready = true;
            std::mem::take(&mut inner.pending)
        };
        for (title, message) in drained {
            deliver(&title, &message);
        }
    }
}

/// Shim wrapper that defers error dialogs until the host is ready.
///
/// The loader runs well before the host's window system; dialogs raised
/// during that window are buffered and flushed, in order, when the host
/// calls [`BufferedShim::mark_ready`]. Opens pass straight through.
#[derive(Debug, Default)]
pub struct BufferedShim<S> {
    inner: S,
    alerts: AlertQueue,
}

impl<S: HostShim> BufferedShim<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            alerts: AlertQueue::new(),
        }
    }

    /// Flush buffered dialogs and deliver all later ones immediately.
    pub fn mark_ready(&self) {
        self.alerts
            .mark_ready(|title, message| self.inner.show_error_dialog(title, message));
    }
}

impl<S: HostShim> HostShim for BufferedShim<S> {
    fn show_error_dialog(&self, title: &str, message: &str) {
        self.alerts
            .push(title, message, |title, message| {
                self.inner.show_error_dialog(title, message)
            });
    }

    fn open_external(&self, url: &str) -> std::io::Result<()> {
        self.inner.open_external(url)
    }

    fn open_path(&self, path: &Path) -> std::io::Result<()> {
        self.inner.open_path(path)
    }
}

/// Shim that routes alerts to the log and refuses external opens.
///
/// Useful for headless runs and tests; real hosts provide their own.
#[derive(Debug, Default)]
pub struct LogShim;

impl HostShim for LogShim {
    fn show_error_dialog(&self, title: &str, message: &str) {
        tracing::error!(title, message, "operator alert");
    }

    fn open_external(&self, url: &str) -> std::io::Result<()> {
        tracing::info!(url, "open_external ignored by LogShim");
        Ok(())
    }

    fn open_path(&self, path: &Path) -> std::io::Result<()> {
        tracing::info!(path = %path.display(), "open_path ignored by LogShim");
        Ok(())
    }
}

/// Test shim that records dialogs for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingShim {
    pub alerts: Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingShim {
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl HostShim for RecordingShim {
    fn show_error_dialog(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }

    fn open_external(&self, _url: &str) -> std::io::Result<()> {
        Ok(())
    }

    fn open_path(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}
