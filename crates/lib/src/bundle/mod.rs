//! Bundler collaborator contract and artifact resolution.
//!
//! The orchestrator never transforms sources itself. Every script entry is
//! handed to a [`Bundler`], which reports what it produced as an
//! [`ArtifactMap`]. The production bundler is [`EsbuildBundler`]; tests use a
//! recording fake.

mod artifact;
mod esbuild;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;

pub use artifact::{Artifact, ArtifactMap, ResolvedArtifact};
pub use esbuild::EsbuildBundler;

use crate::consts::{DEFINE_DEV_SERVER_URL, DEFINE_NODE_ENV, DEFINE_PORT};
use crate::manifest::Target;

#[derive(Debug, Error)]
pub enum BundleError {
  #[error("failed to run bundler '{binary}': {source}")]
  Spawn {
    binary: String,
    #[source]
    source: std::io::Error,
  },

  #[error("bundler exited with code {code:?}: {stderr}")]
  Failed { code: Option<i32>, stderr: String },

  #[error("failed to parse bundler metafile: {0}")]
  Metafile(#[source] serde_json::Error),

  #[error("no output for entry point {}", entry.display())]
  NoOutput { entry: PathBuf },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Output module format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  /// ES module, used for the background worker, popup and dev module server.
  Esm,
  /// Self-executing script, used for content scripts.
  Iife,
}

impl Format {
  pub fn as_str(self) -> &'static str {
    match self {
      Format::Esm => "esm",
      Format::Iife => "iife",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
  /// Output name relative to the output directory, without extension.
  /// `None` lets the bundler derive it from the source path.
  pub name: Option<String>,
  /// Absolute source path.
  pub path: PathBuf,
}

impl EntryPoint {
  pub fn named(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Self {
      name: Some(name.into()),
      path: path.into(),
    }
  }

  pub fn mirrored(path: impl Into<PathBuf>) -> Self {
    Self {
      name: None,
      path: path.into(),
    }
  }
}

/// One bundler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
  pub entries: Vec<EntryPoint>,
  pub out_dir: PathBuf,
  /// Base directory whose layout unnamed entries mirror under `out_dir`.
  pub out_base: Option<PathBuf>,
  pub format: Format,
  pub minify: bool,
  /// Inline source maps.
  pub sourcemap: bool,
  /// Compile-time replacements; values are JavaScript expressions.
  pub defines: BTreeMap<String, String>,
}

impl BundleRequest {
  pub fn new(entries: Vec<EntryPoint>, out_dir: impl Into<PathBuf>, format: Format) -> Self {
    Self {
      entries,
      out_dir: out_dir.into(),
      out_base: None,
      format,
      minify: false,
      sourcemap: false,
      defines: BTreeMap::new(),
    }
  }
}

/// Something that turns entry points into output files.
pub trait Bundler: Send + Sync {
  fn bundle(&self, request: &BundleRequest) -> impl Future<Output = Result<ArtifactMap, BundleError>> + Send;
}

/// Compile-time defines injected into every bundle for `target`.
pub fn defines(target: &Target) -> BTreeMap<String, String> {
  let quote = |s: &str| serde_json::Value::String(s.to_string()).to_string();

  let mut defines = BTreeMap::new();
  defines.insert(DEFINE_NODE_ENV.to_string(), quote(target.mode().node_env()));
  match target {
    Target::Dev(origin) => {
      defines.insert(DEFINE_DEV_SERVER_URL.to_string(), quote(&origin.url()));
      defines.insert(DEFINE_PORT.to_string(), quote(&origin.port().to_string()));
    }
    Target::Build => {
      defines.insert(DEFINE_DEV_SERVER_URL.to_string(), "undefined".to_string());
      defines.insert(DEFINE_PORT.to_string(), "undefined".to_string());
    }
  }
  defines
}
