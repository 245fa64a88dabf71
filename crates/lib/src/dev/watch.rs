//! File watching and change routing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::DevError;
use crate::config::BuildContext;
use crate::consts::IGNORED_DIRS;
use crate::paths::relative_to;

/// Event stream a client subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  Popup,
  Background,
}

/// One changed file, as pushed to event stream clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  /// Project-relative path with `/` separators.
  pub path: String,
  /// Whether popup clients must reload.
  pub popup: bool,
}

impl Notification {
  /// Background clients receive every change; popup clients only what
  /// affects the popup.
  pub fn reaches(&self, scope: Scope) -> bool {
    match scope {
      Scope::Background => true,
      Scope::Popup => self.popup,
    }
  }
}

/// Files whose change must reload the popup.
///
/// The base set (popup document and its scripts) is replaced on every
/// cycle. Inputs reported by the bundler while serving popup modules
/// accumulate until the next manifest change.
#[derive(Debug, Default)]
pub struct WatchRegistry {
  inner: RwLock<Registered>,
}

#[derive(Debug, Default)]
struct Registered {
  base: HashSet<PathBuf>,
  inputs: HashSet<PathBuf>,
}

impl WatchRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_base(&self, files: impl IntoIterator<Item = PathBuf>) {
    if let Ok(mut inner) = self.inner.write() {
      inner.base = files.into_iter().collect();
    }
  }

  /// Records the inputs of a bundled module when the module itself is
  /// watched.
  pub fn add_inputs(&self, module: &Path, inputs: &[PathBuf]) {
    if !self.contains(module) {
      return;
    }
    if let Ok(mut inner) = self.inner.write() {
      inner.inputs.extend(inputs.iter().cloned());
    }
  }

  pub fn clear_inputs(&self) {
    if let Ok(mut inner) = self.inner.write() {
      inner.inputs.clear();
    }
  }

  pub fn contains(&self, path: &Path) -> bool {
    self
      .inner
      .read()
      .map(|inner| inner.base.contains(path) || inner.inputs.contains(path))
      .unwrap_or(false)
  }
}

/// Whether a changed path can produce a notification.
pub fn is_watched(ctx: &BuildContext, path: &Path) -> bool {
  if ctx.is_output(path) {
    return false;
  }
  match relative_to(ctx.root(), path) {
    Some(relative) => !relative
      .components()
      .any(|c| IGNORED_DIRS.iter().any(|dir| c.as_os_str() == *dir)),
    None => false,
  }
}

/// Recursive debounced watcher on the project root.
///
/// Dropping it stops the underlying watcher and closes the change channel.
pub struct FileWatcher {
  _debouncer: Debouncer<RecommendedWatcher>,
}

impl FileWatcher {
  pub fn start(ctx: &BuildContext, debounce: Duration) -> Result<(Self, mpsc::UnboundedReceiver<Vec<PathBuf>>), DevError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let filter = ctx.clone();

    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
      Ok(events) => {
        let mut paths: Vec<PathBuf> = events
          .into_iter()
          .map(|e| e.path)
          .filter(|p| is_watched(&filter, p))
          .collect();
        paths.sort();
        paths.dedup();
        if !paths.is_empty() {
          debug!(count = paths.len(), "files changed");
          let _ = tx.send(paths);
        }
      }
      Err(err) => warn!(error = ?err, "file watcher error"),
    })
    .map_err(|source| DevError::Watch {
      path: ctx.root().to_path_buf(),
      source,
    })?;

    debouncer
      .watcher()
      .watch(ctx.root(), RecursiveMode::Recursive)
      .map_err(|source| DevError::Watch {
        path: ctx.root().to_path_buf(),
        source,
      })?;

    Ok((Self { _debouncer: debouncer }, rx))
  }
}
