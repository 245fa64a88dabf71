use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::assets::AssetError;
use crate::bundle::{ArtifactMap, BundleError};
use crate::config::BuildContext;
use crate::manifest::{Manifest, ManifestError, OutputLayout, ResolveError, ResolvedManifest};
use crate::popup::{PopupError, PopupSource};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Popup(#[from] PopupError),

  #[error(transparent)]
  Bundle(#[from] BundleError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Asset(#[from] AssetError),

  #[error("refusing to clear output directory {} because it contains the project root {}", out_dir.display(), root.display())]
  UnsafeOutDir { out_dir: PathBuf, root: PathBuf },

  #[error("failed to write {}: {source}", path.display())]
  Write { path: PathBuf, source: std::io::Error },
}

impl BuildError {
  pub(crate) fn write(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
    move |source| BuildError::Write {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// One content-script group, bundled by its own bundler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentGroupPlan {
  pub index: usize,
  /// Absolute script paths in manifest order.
  pub scripts: Vec<PathBuf>,
  /// Absolute directory whose layout the group's outputs mirror.
  pub base: PathBuf,
}

impl ContentGroupPlan {
  /// Output directory of the group, relative to the output root.
  pub fn dir_name(&self) -> String {
    format!("content-{}", self.index)
  }
}

/// Everything derived from the author manifest before any bundling.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
  pub manifest: Manifest,
  /// Title of generated popup documents.
  pub title: String,
  pub background: Option<PathBuf>,
  pub popup: Option<PopupSource>,
  pub content_groups: Vec<ContentGroupPlan>,
}

/// A fully produced build waiting to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBuild {
  pub manifest: ResolvedManifest,
  pub layout: OutputLayout,
  pub popup_html: Option<String>,
  pub artifacts: ArtifactMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmitSummary {
  pub out_dir: PathBuf,
  pub manifest: PathBuf,
  pub popup: Option<PathBuf>,
  /// Number of bundled entry points.
  pub entries: usize,
  pub content_groups: usize,
}

/// Refuses to clear an output directory that is the project root or one of
/// its ancestors.
pub(crate) fn check_out_dir(ctx: &BuildContext) -> Result<(), BuildError> {
  if ctx.root().starts_with(ctx.out_dir()) {
    return Err(BuildError::UnsafeOutDir {
      out_dir: ctx.out_dir().to_path_buf(),
      root: ctx.root().to_path_buf(),
    });
  }
  Ok(())
}
