//! Dev HTTP surface.
//!
//! - `GET /popup`, `GET /background`: change event streams
//! - `GET /@webext/client.js`: the live-reload client
//! - `GET /manifest.json`: the current resolved dev manifest
//! - anything else: project files, script sources bundled on demand

use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_lite::Stream;
use tokio::sync::{broadcast, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use super::DevState;
use super::shutdown::ShutdownListener;
use super::watch::{Notification, Scope, WatchRegistry};
use crate::bundle::{self, BundleError, BundleRequest, Bundler, EntryPoint, Format};
use crate::config::BuildContext;
use crate::consts::RELOAD_CLIENT_PATH;
use crate::manifest::{DevOrigin, Target};
use crate::paths::normalize;
use crate::render::RELOAD_CLIENT;

const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "mts", "cjs", "cts"];
const JAVASCRIPT: &str = "application/javascript; charset=utf-8";

/// State shared by every request handler. Handlers only read the dev state.
pub struct AppState<B> {
  pub ctx: BuildContext,
  pub origin: DevOrigin,
  pub bundler: Arc<B>,
  pub state: watch::Receiver<Arc<DevState>>,
  pub events: broadcast::Sender<Notification>,
  pub registry: Arc<WatchRegistry>,
  pub shutdown: ShutdownListener,
  /// Scratch directory for on-demand bundles.
  pub scratch: PathBuf,
  pub counter: AtomicU64,
}

pub fn router<B: Bundler + 'static>(app: Arc<AppState<B>>) -> Router {
  Router::new()
    .route("/popup", get(popup_events::<B>))
    .route("/background", get(background_events::<B>))
    .route(RELOAD_CLIENT_PATH, get(reload_client))
    .route("/manifest.json", get(manifest::<B>))
    .fallback(module::<B>)
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .with_state(app)
}

struct StreamState {
  rx: broadcast::Receiver<Notification>,
  shutdown: ShutdownListener,
  scope: Scope,
}

fn event_data(notification: &Notification) -> String {
  serde_json::json!({ "changed": [notification.path] }).to_string()
}

/// Event stream for `scope`, ending when the session shuts down.
fn event_stream<B>(app: &AppState<B>, scope: Scope) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<B>> {
  let state = StreamState {
    rx: app.events.subscribe(),
    shutdown: app.shutdown.clone(),
    scope,
  };

  let stream = futures_lite::stream::unfold(state, |mut s| async move {
    loop {
      let received = tokio::select! {
        _ = s.shutdown.cancelled() => None,
        received = s.rx.recv() => Some(received),
      };
      match received? {
        Ok(notification) if notification.reaches(s.scope) => {
          let event = Event::default().data(event_data(&notification));
          return Some((Ok(event), s));
        }
        Ok(_) => {}
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          warn!(skipped, scope = ?s.scope, "event stream lagged; skipping missed changes");
        }
        Err(broadcast::error::RecvError::Closed) => return None,
      }
    }
  });

  Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn popup_events<B: Bundler + 'static>(State(app): State<Arc<AppState<B>>>) -> impl IntoResponse {
  debug!("popup client connected");
  event_stream(&app, Scope::Popup)
}

async fn background_events<B: Bundler + 'static>(State(app): State<Arc<AppState<B>>>) -> impl IntoResponse {
  debug!("background client connected");
  event_stream(&app, Scope::Background)
}

async fn reload_client() -> impl IntoResponse {
  ([(header::CONTENT_TYPE, JAVASCRIPT)], RELOAD_CLIENT)
}

async fn manifest<B: Bundler + 'static>(State(app): State<Arc<AppState<B>>>) -> Response {
  let current = app.state.borrow().clone();
  match current.manifest.to_json() {
    Ok(json) => ([(header::CONTENT_TYPE, "application/json")], json).into_response(),
    Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
  }
}

/// Maps a request path onto a file under the root. Paths that climb out of
/// the root resolve to nothing.
pub fn resolve_request(root: &Path, request_path: &str) -> Option<PathBuf> {
  let relative = Path::new(request_path.trim_start_matches('/'));
  if relative
    .components()
    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
  {
    return None;
  }
  let path = normalize(&root.join(relative));
  path.starts_with(root).then_some(path)
}

fn is_script(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e))
}

fn mime_type(path: &Path) -> &'static str {
  match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
    "html" | "htm" => "text/html; charset=utf-8",
    "css" => "text/css; charset=utf-8",
    "json" | "map" => "application/json",
    "svg" => "image/svg+xml",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "ico" => "image/x-icon",
    "woff" => "font/woff",
    "woff2" => "font/woff2",
    "wasm" => "application/wasm",
    "txt" => "text/plain; charset=utf-8",
    _ => "application/octet-stream",
  }
}

/// Appends a stylesheet injection so CSS imported by a module applies when
/// the module is loaded in a page.
fn with_stylesheet(code: String, css: &str) -> String {
  let css = serde_json::Value::String(css.to_string()).to_string();
  format!(
    "{code}\nif (typeof document !== \"undefined\") {{\n  const style = document.createElement(\"style\");\n  style.textContent = {css};\n  document.head.append(style);\n}}\n"
  )
}

async fn bundle_and_read<B: Bundler>(app: &AppState<B>, request: &BundleRequest, path: &Path) -> Result<String, BundleError> {
  let artifacts = app.bundler.bundle(request).await?;
  let artifact = artifacts.get(path).ok_or_else(|| BundleError::NoOutput {
    entry: path.to_path_buf(),
  })?;
  app.registry.add_inputs(path, &artifact.inputs);

  let code = tokio::fs::read_to_string(&artifact.output).await?;
  match &artifact.css_bundle {
    Some(css) => Ok(with_stylesheet(code, &tokio::fs::read_to_string(css).await?)),
    None => Ok(code),
  }
}

/// Bundles one module into its own scratch directory and returns the code.
async fn bundle_module<B: Bundler>(app: &AppState<B>, path: &Path) -> Result<String, BundleError> {
  let id = app.counter.fetch_add(1, Ordering::Relaxed);
  let out_dir = app.scratch.join(id.to_string());

  let mut request = BundleRequest::new(vec![EntryPoint::named("module", path)], &out_dir, Format::Esm);
  request.sourcemap = true;
  request.defines = bundle::defines(&Target::Dev(app.origin.clone()));

  let result = bundle_and_read(app, &request, path).await;

  if let Err(e) = tokio::fs::remove_dir_all(&out_dir).await {
    debug!(error = %e, dir = ?out_dir, "failed to remove scratch output");
  }
  result
}

async fn module<B: Bundler + 'static>(State(app): State<Arc<AppState<B>>>, uri: Uri) -> Response {
  let Some(path) = resolve_request(app.ctx.root(), uri.path()) else {
    return StatusCode::NOT_FOUND.into_response();
  };
  if !path.is_file() {
    return StatusCode::NOT_FOUND.into_response();
  }

  if is_script(&path) {
    return match bundle_module(&app, &path).await {
      Ok(code) => ([(header::CONTENT_TYPE, JAVASCRIPT)], code).into_response(),
      Err(e) => {
        error!(error = %e, path = ?path, "failed to bundle module");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
      }
    };
  }

  match tokio::fs::read(&path).await {
    Ok(bytes) => ([(header::CONTENT_TYPE, mime_type(&path))], bytes).into_response(),
    Err(e) => {
      warn!(error = %e, path = ?path, "failed to read file");
      StatusCode::NOT_FOUND.into_response()
    }
  }
}
