//! Popup entry handling.
//!
//! `action.default_popup` names either an HTML document or a script. A
//! document is scanned for its local `<script src>` references, each of which
//! becomes a bundler entry; a script is wrapped in a generated document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::bundle::{EntryPoint, ResolvedArtifact};
use crate::config::BuildContext;
use crate::consts::{DEV_POPUP_SHIM, POPUP_SCRIPT_NAME};
use crate::html::{find_scripts, inject_into_head, rewrite_script_srcs};
use crate::manifest::DevOrigin;
use crate::paths::absolutize;
use crate::render::{classic_script, module_script, reload_client_url, render_lines, render_popup, stylesheet_link};

#[derive(Debug, Error)]
pub enum PopupError {
  #[error("failed to read popup document {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupSource {
  Document {
    path: PathBuf,
    html: String,
    /// Local scripts in document order, deduplicated.
    scripts: Vec<PathBuf>,
  },
  Script {
    path: PathBuf,
  },
}

fn is_document(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

/// Source path a `src` attribute refers to: relative to the document, or to
/// the project root when it starts with `/`.
fn resolve_src(ctx: &BuildContext, document: &Path, src: &str) -> PathBuf {
  let src = src.split(['?', '#']).next().unwrap_or_default();
  if src.starts_with('/') {
    ctx.source(src)
  } else {
    let dir = document.parent().unwrap_or(ctx.root());
    absolutize(dir, Path::new(src))
  }
}

impl PopupSource {
  pub async fn load(ctx: &BuildContext, logical: &str) -> Result<Self, PopupError> {
    let path = ctx.source(logical);
    if !is_document(&path) {
      return Ok(PopupSource::Script { path });
    }

    let html = tokio::fs::read_to_string(&path).await.map_err(|source| PopupError::Read {
      path: path.clone(),
      source,
    })?;

    let mut scripts: Vec<PathBuf> = Vec::new();
    for tag in find_scripts(&html).iter().filter(|t| t.is_local()) {
      let script = resolve_src(ctx, &path, &tag.src);
      if !scripts.contains(&script) {
        scripts.push(script);
      }
    }
    debug!(document = ?path, scripts = scripts.len(), "loaded popup document");

    Ok(PopupSource::Document { path, html, scripts })
  }

  pub fn path(&self) -> &Path {
    match self {
      PopupSource::Document { path, .. } | PopupSource::Script { path } => path,
    }
  }

  /// Script entry paths in bundling order.
  pub fn scripts(&self) -> Vec<PathBuf> {
    match self {
      PopupSource::Document { scripts, .. } => scripts.clone(),
      PopupSource::Script { path } => vec![path.clone()],
    }
  }

  /// Entry points named `default_popup`, or `default_popup-<i>` when the
  /// document loads several scripts.
  pub fn entry_points(&self) -> Vec<EntryPoint> {
    let scripts = self.scripts();
    let single = scripts.len() == 1;
    scripts
      .into_iter()
      .enumerate()
      .map(|(i, path)| {
        let name = if single {
          POPUP_SCRIPT_NAME.to_string()
        } else {
          format!("{}-{}", POPUP_SCRIPT_NAME, i)
        };
        EntryPoint::named(name, path)
      })
      .collect()
  }

  /// Files whose change must reload the popup, before bundler inputs.
  pub fn watch_files(&self) -> Vec<PathBuf> {
    let mut files = vec![self.path().to_path_buf()];
    if let PopupSource::Document { scripts, .. } = self {
      files.extend(scripts.iter().cloned());
    }
    files
  }

  /// Production document. `outputs` holds the bundled artifact of each
  /// script, keyed by source path.
  pub fn render_build(&self, ctx: &BuildContext, title: &str, outputs: &BTreeMap<PathBuf, ResolvedArtifact>) -> String {
    let mut styles: Vec<String> = Vec::new();
    for script in self.scripts() {
      if let Some(css) = outputs.get(&script).and_then(|a| a.css_bundle.as_ref()) {
        let href = format!("./{}", css);
        if !styles.contains(&href) {
          styles.push(href);
        }
      }
    }

    match self {
      PopupSource::Document { path, html, .. } => {
        let rewritten = rewrite_script_srcs(html, |tag| {
          if !tag.is_local() {
            return None;
          }
          let script = resolve_src(ctx, path, &tag.src);
          outputs.get(&script).map(|a| format!("./{}", a.output))
        });
        if styles.is_empty() {
          rewritten
        } else {
          let links: Vec<String> = styles.iter().map(|s| stylesheet_link(s)).collect();
          inject_into_head(&rewritten, &render_lines(links))
        }
      }
      PopupSource::Script { path } => {
        let scripts: Vec<String> = outputs.get(path).map(|a| format!("./{}", a.output)).into_iter().collect();
        render_popup(title, &scripts, &styles)
      }
    }
  }

  /// Dev document: scripts load from the dev server, preceded by the dev
  /// popup shim and the live-reload client.
  pub fn render_dev(&self, ctx: &BuildContext, origin: &DevOrigin, title: &str) -> String {
    let shim = format!("./{}", DEV_POPUP_SHIM);
    let client = reload_client_url(origin, "popup");
    let served = |path: &Path| ctx.logical(path).map(|logical| origin.join(&logical));

    match self {
      PopupSource::Document { path, html, .. } => {
        let rewritten = rewrite_script_srcs(html, |tag| {
          if !tag.is_local() {
            return None;
          }
          served(resolve_src(ctx, path, &tag.src).as_path())
        });
        inject_into_head(&rewritten, &render_lines([classic_script(&shim), module_script(&client)]))
      }
      PopupSource::Script { path } => {
        let mut scripts = vec![shim, client];
        scripts.extend(served(path.as_path()));
        render_popup(title, &scripts, &[])
      }
    }
  }
}
