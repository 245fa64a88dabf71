//! Author manifest to resolved manifest transform.
//!
//! [`resolve`] is pure: given the author manifest, the build target and the
//! output layout produced for this cycle, it always yields the same
//! [`ResolvedManifest`]. It must only run after every artifact of the cycle
//! has been produced, since the layout carries the emitted file names.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::types::{Background, Manifest};
use crate::consts::{DEFAULT_EXTENSION_PAGES_CSP, DEV_NAME_SUFFIX, POPUP_DOCUMENT};
use crate::csp::Policy;

/// Failure to determine the dev server origin.
#[derive(Debug, Error)]
pub enum HostError {
  #[error("dev server has no local address: {0}")]
  NoAddress(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ResolveError {
  /// An entry declared in the manifest never produced an output.
  #[error("no output for entry point {entry}")]
  NoOutput { entry: String },

  #[error("failed to serialize manifest: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Origin of a bound dev server, e.g. `http://localhost:8000`.
///
/// Only obtainable from a bound address, so a dev manifest can never be
/// resolved against a placeholder host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevOrigin {
  port: u16,
}

impl DevOrigin {
  pub fn from_addr(addr: SocketAddr) -> Self {
    Self { port: addr.port() }
  }

  pub fn from_listener(listener: &tokio::net::TcpListener) -> Result<Self, HostError> {
    listener.local_addr().map(Self::from_addr).map_err(HostError::NoAddress)
  }

  pub fn port(&self) -> u16 {
    self.port
  }

  pub fn url(&self) -> String {
    format!("http://localhost:{}", self.port)
  }

  /// Absolute URL of a project-relative path on the dev server.
  pub fn join(&self, path: &str) -> String {
    format!("{}/{}", self.url(), path.trim_start_matches('/'))
  }
}

impl fmt::Display for DevOrigin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.url())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Dev,
  Build,
}

impl Mode {
  /// `development` selects dev mode; anything else, including unset, builds.
  pub fn from_node_env(value: Option<&str>) -> Self {
    match value {
      Some(v) if v.eq_ignore_ascii_case("development") => Mode::Dev,
      _ => Mode::Build,
    }
  }

  pub fn node_env(self) -> &'static str {
    match self {
      Mode::Dev => "development",
      Mode::Build => "production",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
  Build,
  Dev(DevOrigin),
}

impl Target {
  pub fn mode(&self) -> Mode {
    match self {
      Target::Build => Mode::Build,
      Target::Dev(_) => Mode::Dev,
    }
  }
}

/// Output-relative paths produced for each declared entry in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputLayout {
  pub background: Option<String>,
  pub popup: Option<String>,
  /// Output scripts per content-script group, indexed like the manifest.
  pub content_scripts: Vec<Vec<String>>,
  /// Static asset (icons, stylesheets) logical path to output path.
  pub assets: BTreeMap<String, String>,
}

/// A manifest whose paths all point at emitted artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedManifest(Manifest);

impl ResolvedManifest {
  pub fn manifest(&self) -> &Manifest {
    &self.0
  }

  pub fn to_json(&self) -> Result<String, ResolveError> {
    let mut json = serde_json::to_string_pretty(&self.0)?;
    json.push('\n');
    Ok(json)
  }
}

/// Computes the extension page policy for `target`.
///
/// Dev targets append the dev origin to every directive so extension pages may
/// load modules from the dev server.
pub fn resolve_policy(author: Option<&str>, target: &Target) -> Option<String> {
  match target {
    Target::Build => author.map(|p| Policy::parse(p).serialize()),
    Target::Dev(origin) => {
      let mut policy = Policy::parse(author.unwrap_or(DEFAULT_EXTENSION_PAGES_CSP));
      policy.append_source(&origin.url());
      Some(policy.serialize())
    }
  }
}

fn no_output(entry: &str) -> ResolveError {
  ResolveError::NoOutput {
    entry: entry.to_string(),
  }
}

fn asset(layout: &OutputLayout, logical: &str) -> Result<String, ResolveError> {
  layout.assets.get(logical).cloned().ok_or_else(|| no_output(logical))
}

/// Rewrites a path, or every path of a size map.
fn resolve_asset_value(layout: &OutputLayout, value: &Value) -> Result<Value, ResolveError> {
  match value {
    Value::String(logical) => Ok(Value::String(asset(layout, logical)?)),
    Value::Object(sizes) => {
      let mut resolved = Map::new();
      for (size, path) in sizes {
        resolved.insert(size.clone(), resolve_asset_value(layout, path)?);
      }
      Ok(Value::Object(resolved))
    }
    other => Ok(other.clone()),
  }
}

pub fn resolve(author: &Manifest, target: &Target, layout: &OutputLayout) -> Result<ResolvedManifest, ResolveError> {
  let mut manifest = author.clone();

  if manifest.manifest_version != 3 {
    warn!(
      declared = manifest.manifest_version,
      "manifest_version is always emitted as 3"
    );
    manifest.manifest_version = 3;
  }

  if let (Target::Dev(_), Some(name)) = (target, &manifest.name) {
    manifest.name = Some(format!("{}{}", name, DEV_NAME_SUFFIX));
  }

  if let Some(background) = &author.background {
    let service_worker = layout
      .background
      .clone()
      .ok_or_else(|| no_output(&background.service_worker))?;
    manifest.background = Some(Background {
      service_worker,
      kind: Some("module".to_string()),
      extra: background.extra.clone(),
    });
  }

  if let Some(popup) = author.popup() {
    if layout.popup.is_none() {
      return Err(no_output(popup));
    }
    if let Some(action) = manifest.action.as_mut() {
      action.default_popup = Some(POPUP_DOCUMENT.to_string());
    }
  }

  if let Some(action) = manifest.action.as_mut() {
    if let Some(icon) = action.extra.get("default_icon") {
      let resolved = resolve_asset_value(layout, icon)?;
      action.extra.insert("default_icon".to_string(), resolved);
    }
  }

  if let Some(policy) = resolve_policy(author.extension_pages_policy(), target) {
    let csp = manifest.content_security_policy.get_or_insert_with(Default::default);
    csp.extension_pages = Some(policy);
  }

  if let Some(groups) = &author.content_scripts {
    let mut registered = Vec::new();
    for (index, group) in groups.iter().enumerate() {
      let outputs = match layout.content_scripts.get(index) {
        Some(outputs) => outputs,
        None if group.js.is_empty() => continue,
        None => return Err(no_output(&group.js[0])),
      };
      if !group.is_registered() {
        continue;
      }
      let mut resolved = group.clone();
      resolved.js = outputs.clone();
      let css = group
        .css()
        .into_iter()
        .map(|logical| asset(layout, logical).map(Value::String))
        .collect::<Result<Vec<_>, _>>()?;
      if resolved.js.is_empty() && css.is_empty() {
        warn!(group = index, "content script group has no scripts or stylesheets; not registering it");
        continue;
      }
      if !css.is_empty() {
        resolved.extra.insert("css".to_string(), Value::Array(css));
      }
      registered.push(resolved);
    }
    manifest.content_scripts = if registered.is_empty() { None } else { Some(registered) };
  }

  if let Some(icons) = &author.icons {
    let mut resolved = BTreeMap::new();
    for (size, logical) in icons {
      resolved.insert(size.clone(), asset(layout, logical)?);
    }
    manifest.icons = Some(resolved);
  }

  Ok(ResolvedManifest(manifest))
}
