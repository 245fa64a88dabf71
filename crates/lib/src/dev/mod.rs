//! Development sessions.
//!
//! A session moves through explicit states:
//!
//! ```text
//! DevSession<Idle> --bind()--> DevSession<Listening> --serve()--> DevSession<Closed>
//! ```
//!
//! The dev origin only exists once the listener is bound, so nothing can be
//! resolved against an unknown host. While serving, the session owns the
//! single writer of the dev state; request handlers read snapshots of it.
//!
//! # Submodules
//!
//! - [`artifacts`] - bootstrap files written to the output directory
//! - [`server`] - HTTP routes
//! - [`shutdown`] - cooperative shutdown signal
//! - [`watch`] - file watcher and change routing

pub mod artifacts;
pub mod server;
pub mod shutdown;
pub mod watch;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch as state_channel};
use tracing::{debug, error, info, warn};

pub use shutdown::{Shutdown, ShutdownListener};
pub use watch::{Notification, Scope, WatchRegistry};

use crate::assets::AssetError;
use crate::build::{self, BuildError, BuildPlan};
use crate::bundle::Bundler;
use crate::config::BuildContext;
use crate::manifest::{DevOrigin, HostError, Manifest, ManifestError, ResolveError, ResolvedManifest};
use crate::popup::PopupError;
use crate::util::fs::clear_dir;
use artifacts::write_dev_artifacts;
use server::{AppState, router};
use watch::FileWatcher;

/// Buffered notifications per event stream before a slow client lags.
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum DevError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Popup(#[from] PopupError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Host(#[from] HostError),

  #[error(transparent)]
  Asset(#[from] AssetError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("failed to bind dev server on {addr}: {source}")]
  Bind { addr: SocketAddr, source: std::io::Error },

  #[error("failed to watch {}: {source}", path.display())]
  Watch {
    path: PathBuf,
    source: notify_debouncer_mini::notify::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevConfig {
  /// `0` binds an ephemeral port.
  pub port: u16,
  pub debounce: Duration,
}

impl Default for DevConfig {
  fn default() -> Self {
    Self {
      port: crate::consts::DEFAULT_PORT,
      debounce: Duration::from_millis(200),
    }
  }
}

/// Snapshot of the session, replaced wholesale after every successful cycle.
#[derive(Debug, Clone)]
pub struct DevState {
  pub author: Manifest,
  pub plan: BuildPlan,
  pub manifest: ResolvedManifest,
}

#[derive(Debug)]
pub struct Idle;

#[derive(Debug)]
pub struct Listening {
  listener: TcpListener,
  origin: DevOrigin,
}

/// A session that has shut down.
#[derive(Debug)]
pub struct Closed {
  /// Change cycles handled while serving.
  pub cycles: usize,
}

#[derive(Debug)]
pub struct DevSession<S> {
  ctx: BuildContext,
  config: DevConfig,
  state: S,
}

impl<S> DevSession<S> {
  pub fn context(&self) -> &BuildContext {
    &self.ctx
  }
}

impl DevSession<Idle> {
  pub fn new(ctx: BuildContext, config: DevConfig) -> Self {
    Self {
      ctx,
      config,
      state: Idle,
    }
  }

  pub async fn bind(self) -> Result<DevSession<Listening>, DevError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.config.port));
    let listener = TcpListener::bind(addr)
      .await
      .map_err(|source| DevError::Bind { addr, source })?;
    let origin = DevOrigin::from_listener(&listener)?;
    info!(origin = %origin, "dev server listening");

    Ok(DevSession {
      ctx: self.ctx,
      config: self.config,
      state: Listening { listener, origin },
    })
  }
}

impl DevSession<Closed> {
  pub fn cycles(&self) -> usize {
    self.state.cycles
  }
}

/// Loads and plans the author manifest, then rewrites the dev artifact set.
async fn cycle(ctx: &BuildContext, origin: &DevOrigin, author: Manifest) -> Result<DevState, DevError> {
  let plan = build::plan(ctx, author.clone()).await?;
  let manifest = write_dev_artifacts(ctx, origin, &plan).await?;
  Ok(DevState { author, plan, manifest })
}

impl DevSession<Listening> {
  pub fn origin(&self) -> &DevOrigin {
    &self.state.origin
  }

  /// Serves until `shutdown` triggers.
  ///
  /// Failing to produce the initial artifact set is fatal. Failures in later
  /// cycles are logged and the previous state stays in place.
  pub async fn serve<B: Bundler + 'static>(self, bundler: B, shutdown: Shutdown) -> Result<DevSession<Closed>, DevError> {
    let DevSession { ctx, config, state } = self;
    let Listening { listener, origin } = state;

    build::check_out_dir(&ctx)?;
    clear_dir(ctx.out_dir()).await.map_err(|source| DevError::Write {
      path: ctx.out_dir().to_path_buf(),
      source,
    })?;
    let author = Manifest::load(ctx.manifest_path())?;
    let initial = cycle(&ctx, &origin, author).await?;
    info!(out_dir = ?ctx.out_dir(), "dev artifacts written");

    let registry = Arc::new(WatchRegistry::new());
    registry.set_base(popup_files(&initial.plan));

    let (state_tx, state_rx) = state_channel::channel(Arc::new(initial));
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let scratch = tempfile::Builder::new()
      .prefix("webext-dev")
      .tempdir()
      .map_err(|source| DevError::Write {
        path: std::env::temp_dir(),
        source,
      })?;

    let app = Arc::new(AppState {
      ctx: ctx.clone(),
      origin: origin.clone(),
      bundler: Arc::new(bundler),
      state: state_rx,
      events: events.clone(),
      registry: registry.clone(),
      shutdown: shutdown.listener(),
      scratch: scratch.path().to_path_buf(),
      counter: AtomicU64::new(0),
    });

    let (watcher, mut changes) = FileWatcher::start(&ctx, config.debounce)?;

    let mut server_shutdown = shutdown.listener();
    let server = tokio::spawn(async move {
      axum::serve(listener, router(app))
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
    });

    let mut cycles = 0;
    let mut stop = shutdown.listener();
    loop {
      let batch = tokio::select! {
        _ = stop.cancelled() => None,
        batch = changes.recv() => batch,
      };
      let Some(paths) = batch else {
        break;
      };
      cycles += 1;

      let current = state_tx.borrow().clone();
      let manifest_changed = paths.iter().any(|p| p.as_path() == ctx.manifest_path());

      match rebuild(&ctx, &origin, &current, manifest_changed).await {
        Ok(next) => {
          if manifest_changed {
            registry.clear_inputs();
          }
          registry.set_base(popup_files(&next.plan));
          state_tx.send_replace(Arc::new(next));
        }
        Err(e) => error!(error = %e, "dev rebuild failed; keeping previous state"),
      }

      for path in &paths {
        let is_manifest = path.as_path() == ctx.manifest_path();
        let notification = Notification {
          path: ctx.logical(path).unwrap_or_else(|| path.display().to_string()),
          popup: is_manifest || registry.contains(path),
        };
        debug!(path = %notification.path, popup = notification.popup, "notifying clients");
        // No subscribers is not an error.
        let _ = events.send(notification);
      }
    }

    drop(watcher);
    shutdown.trigger();
    match server.await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => warn!(error = %e, "dev server stopped with an error"),
      Err(e) => warn!(error = %e, "dev server task failed"),
    }
    info!(cycles, "dev session closed");

    Ok(DevSession {
      ctx,
      config,
      state: Closed { cycles },
    })
  }
}

fn popup_files(plan: &BuildPlan) -> Vec<PathBuf> {
  plan.popup.as_ref().map(|p| p.watch_files()).unwrap_or_default()
}

async fn rebuild(
  ctx: &BuildContext,
  origin: &DevOrigin,
  current: &DevState,
  manifest_changed: bool,
) -> Result<DevState, DevError> {
  let author = if manifest_changed {
    info!("manifest changed; reloading");
    Manifest::load(ctx.manifest_path())?
  } else {
    current.author.clone()
  };
  cycle(ctx, origin, author).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{FakeBundler, example_project};
  use std::path::Path;
  use tempfile::TempDir;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpStream;

  fn session(temp: &TempDir) -> DevSession<Idle> {
    let ctx = BuildContext::new(temp.path(), Path::new("dist")).unwrap();
    DevSession::new(
      ctx,
      DevConfig {
        port: 0,
        debounce: Duration::from_millis(50),
      },
    )
  }

  async fn wait_for_file(path: &Path) {
    for _ in 0..200 {
      if path.is_file() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("{} was never written", path.display());
  }

  async fn get(port: u16, path: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nOrigin: chrome-extension://abc\r\nConnection: close\r\n\r\n", path);
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
  }

  #[tokio::test]
  async fn bind_yields_the_bound_origin() {
    let temp = TempDir::new().unwrap();
    let listening = session(&temp).bind().await.unwrap();

    assert_ne!(listening.origin().port(), 0);
    assert!(format!("{:?}", listening).contains("Listening"));
    assert_eq!(
      listening.origin().url(),
      format!("http://localhost:{}", listening.origin().port())
    );
  }

  #[tokio::test]
  async fn missing_manifest_is_fatal() {
    let temp = TempDir::new().unwrap();
    let listening = session(&temp).bind().await.unwrap();

    let err = listening.serve(FakeBundler::new(), Shutdown::new()).await.unwrap_err();
    assert!(matches!(err, DevError::Manifest(ManifestError::NotFound { .. })));
  }

  #[tokio::test]
  async fn serves_and_notifies_on_manifest_change() {
    let temp = TempDir::new().unwrap();
    example_project(temp.path());
    let listening = session(&temp).bind().await.unwrap();
    let origin = listening.origin().clone();
    let port = origin.port();
    let ctx = listening.context().clone();

    let shutdown = Shutdown::new();
    let session = tokio::spawn(listening.serve(FakeBundler::new(), shutdown.clone()));

    let manifest_path = ctx.out_dir().join("manifest.json");
    wait_for_file(&manifest_path).await;
    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
    assert!(
      written["content_security_policy"]["extension_pages"]
        .as_str()
        .unwrap()
        .contains(&origin.url())
    );

    let client = get(port, "/@webext/client.js").await;
    assert!(client.contains("EventSource"));

    let served = get(port, "/manifest.json").await;
    assert!(served.contains("Example [DEV]"));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
      .write_all(b"GET /background HTTP/1.1\r\nHost: localhost\r\n\r\n")
      .await
      .unwrap();

    let read_until_changed = async {
      let mut seen = String::new();
      let mut buf = [0u8; 1024];
      let mut rewritten = false;
      loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "stream closed early: {}", seen);
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        if !rewritten && seen.contains("text/event-stream") {
          rewritten = true;
          let manifest = std::fs::read_to_string(ctx.manifest_path()).unwrap();
          std::fs::write(ctx.manifest_path(), manifest.replace("1.0.0", "1.0.1")).unwrap();
        }
        if seen.contains(r#"{"changed":["manifest.json"]}"#) {
          return seen;
        }
      }
    };
    let seen = tokio::time::timeout(Duration::from_secs(10), read_until_changed)
      .await
      .expect("no change event received");
    assert!(seen.contains("data: "));

    shutdown.trigger();
    let closed = tokio::time::timeout(Duration::from_secs(5), session)
      .await
      .unwrap()
      .unwrap()
      .unwrap();
    assert!(closed.cycles() >= 1);

    let reloaded: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
    assert_eq!(reloaded["version"], "1.0.1");
  }

  #[tokio::test]
  async fn broken_manifest_keeps_the_session_running() {
    let temp = TempDir::new().unwrap();
    example_project(temp.path());
    let listening = session(&temp).bind().await.unwrap();
    let ctx = listening.context().clone();

    let shutdown = Shutdown::new();
    let session = tokio::spawn(listening.serve(FakeBundler::new(), shutdown.clone()));

    let manifest_path = ctx.out_dir().join("manifest.json");
    wait_for_file(&manifest_path).await;
    let original = std::fs::read_to_string(ctx.manifest_path()).unwrap();

    std::fs::write(ctx.manifest_path(), "{ not json").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!session.is_finished());

    std::fs::write(ctx.manifest_path(), original.replace("1.0.0", "2.0.0")).unwrap();
    let recovered = async {
      loop {
        let version = std::fs::read_to_string(&manifest_path)
          .ok()
          .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
          .map(|json| json["version"].clone());
        if version == Some(serde_json::json!("2.0.0")) {
          return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
      }
    };
    tokio::time::timeout(Duration::from_secs(10), recovered)
      .await
      .expect("fixed manifest was never written");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), session)
      .await
      .unwrap()
      .unwrap()
      .unwrap();
  }

  #[tokio::test]
  async fn module_server_bundles_scripts_and_rejects_traversal() {
    let temp = TempDir::new().unwrap();
    example_project(temp.path());
    let listening = session(&temp).bind().await.unwrap();
    let port = listening.origin().port();
    let ctx = listening.context().clone();

    let shutdown = Shutdown::new();
    let session = tokio::spawn(listening.serve(FakeBundler::new(), shutdown.clone()));
    wait_for_file(&ctx.out_dir().join("manifest.json")).await;

    let module = get(port, "/src/popup.tsx").await;
    assert!(module.starts_with("HTTP/1.1 200"));
    assert!(module.contains("// esm"));
    assert!(module.contains("document.createElement(\"style\")"));
    assert!(module.to_ascii_lowercase().contains("access-control-allow-origin: *"));

    let icon = get(port, "/icons/16.png").await;
    assert!(icon.to_ascii_lowercase().contains("content-type: image/png"));

    assert!(get(port, "/../secret").await.starts_with("HTTP/1.1 404"));
    assert!(get(port, "/src/missing.ts").await.starts_with("HTTP/1.1 404"));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), session)
      .await
      .unwrap()
      .unwrap()
      .unwrap();
  }
}
