//! esbuild subprocess driver.
//!
//! Runs the `esbuild` binary with `--bundle --metafile` and converts the
//! metafile it writes into an [`ArtifactMap`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Artifact, ArtifactMap, BundleError, BundleRequest, Bundler};
use crate::paths::absolutize;

#[derive(Debug, Clone)]
pub struct EsbuildBundler {
  binary: String,
  /// Working directory; metafile paths are relative to it.
  cwd: PathBuf,
  target: String,
}

#[derive(Debug, Default, Deserialize)]
struct Metafile {
  #[serde(default)]
  outputs: BTreeMap<String, MetaOutput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaOutput {
  entry_point: Option<String>,
  css_bundle: Option<String>,
  #[serde(default)]
  inputs: BTreeMap<String, serde_json::Value>,
}

impl EsbuildBundler {
  pub fn new(binary: impl Into<String>, cwd: impl Into<PathBuf>, target: impl Into<String>) -> Self {
    Self {
      binary: binary.into(),
      cwd: cwd.into(),
      target: target.into(),
    }
  }

  fn args(&self, request: &BundleRequest, metafile: &Path) -> Vec<String> {
    let mut args: Vec<String> = request
      .entries
      .iter()
      .map(|entry| match &entry.name {
        Some(name) => format!("{}={}", name, entry.path.display()),
        None => entry.path.display().to_string(),
      })
      .collect();

    args.push("--bundle".to_string());
    args.push(format!("--outdir={}", request.out_dir.display()));
    if let Some(base) = &request.out_base {
      args.push(format!("--outbase={}", base.display()));
    }
    args.push(format!("--format={}", request.format.as_str()));
    args.push(format!("--target={}", self.target));
    if request.minify {
      args.push("--minify".to_string());
    }
    if request.sourcemap {
      args.push("--sourcemap=inline".to_string());
    }
    for (key, value) in &request.defines {
      args.push(format!("--define:{}={}", key, value));
    }
    args.push(format!("--metafile={}", metafile.display()));
    args.push("--log-level=warning".to_string());
    args
  }

  fn artifacts(&self, metafile: Metafile) -> ArtifactMap {
    let resolve = |p: &str| absolutize(&self.cwd, Path::new(p));
    let is_css = |p: &str| p.ends_with(".css");

    let mut map = ArtifactMap::new();
    let mut stylesheets: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

    for (output, meta) in &metafile.outputs {
      if !is_css(output.as_str()) {
        continue;
      }
      let output = resolve(output.as_str());
      match meta.entry_point.as_deref() {
        Some(entry) => {
          stylesheets.insert(resolve(entry), output);
        }
        None => {
          stylesheets.insert(output.with_extension("js"), output);
        }
      }
    }

    for (output, meta) in metafile.outputs {
      let Some(entry) = meta.entry_point.as_deref() else {
        continue;
      };
      if is_css(output.as_str()) {
        continue;
      }

      let entry = resolve(entry);
      let output = resolve(output.as_str());
      let css_bundle = meta
        .css_bundle
        .as_deref()
        .map(resolve)
        .or_else(|| stylesheets.get(&entry).cloned())
        .or_else(|| stylesheets.get(&output).cloned());
      // Virtual modules are reported as `(disabled):x` or `<stdin>`.
      let inputs = meta
        .inputs
        .keys()
        .filter(|k| !k.starts_with('(') && !k.starts_with('<'))
        .map(|k| resolve(k.as_str()))
        .collect();

      map.insert(Artifact {
        entry,
        output,
        css_bundle,
        inputs,
      });
    }

    map
  }
}

impl Bundler for EsbuildBundler {
  async fn bundle(&self, request: &BundleRequest) -> Result<ArtifactMap, BundleError> {
    tokio::fs::create_dir_all(&request.out_dir).await?;

    let metafile = tempfile::Builder::new().prefix("esbuild-meta").suffix(".json").tempfile()?;
    let args = self.args(request, metafile.path());

    info!(entries = request.entries.len(), out_dir = ?request.out_dir, format = request.format.as_str(), "bundling");
    debug!(binary = %self.binary, args = ?args, "spawning bundler");

    let output = Command::new(&self.binary)
      .args(&args)
      .current_dir(&self.cwd)
      .output()
      .await
      .map_err(|source| BundleError::Spawn {
        binary: self.binary.clone(),
        source,
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      return Err(BundleError::Failed {
        code: output.status.code(),
        stderr,
      });
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
      debug!(stderr = %stderr, "bundler output");
    }

    let content = tokio::fs::read_to_string(metafile.path()).await?;
    let meta: Metafile = serde_json::from_str(&content).map_err(BundleError::Metafile)?;
    Ok(self.artifacts(meta))
  }
}
