//! Static assets copied verbatim into the output directory.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::BuildContext;
use crate::manifest::Manifest;
use crate::paths::{normalize, to_slash};
use crate::util::fs::copy_file;

#[derive(Debug, Error)]
pub enum AssetError {
  #[error("failed to copy {}: {source}", path.display())]
  Copy { path: PathBuf, source: std::io::Error },
}

/// Output path of a static asset, relative to the output root.
///
/// Assets keep their project-relative location; assets that live outside
/// the project land in `icons/` under their file name.
pub fn asset_output(logical: &str) -> String {
  let normalized = normalize(Path::new(logical.trim_start_matches('/')));
  let escapes = normalized
    .components()
    .any(|c| !matches!(c, Component::Normal(_)));

  if escapes {
    let name = normalized.file_name().map(PathBuf::from).unwrap_or_default();
    to_slash(&Path::new("icons").join(name))
  } else {
    to_slash(&normalized)
  }
}

/// Static files the manifest references by path: `icons`, the action's
/// `default_icon` and content-script stylesheets.
pub fn declared_assets(manifest: &Manifest) -> Vec<&str> {
  let mut assets: Vec<&str> = Vec::new();
  if let Some(icons) = &manifest.icons {
    assets.extend(icons.values().map(String::as_str));
  }
  if let Some(action) = &manifest.action {
    assets.extend(action.default_icons());
  }
  for group in manifest.content_groups() {
    assets.extend(group.css());
  }
  assets
}

/// Copies every declared asset. Returns logical path to output path, the
/// shape [`crate::manifest::OutputLayout::assets`] expects.
pub async fn copy_assets(ctx: &BuildContext, manifest: &Manifest) -> Result<BTreeMap<String, String>, AssetError> {
  let mut copied = BTreeMap::new();

  for logical in declared_assets(manifest) {
    if copied.contains_key(logical) {
      continue;
    }
    let source = ctx.source(logical);
    let output = asset_output(logical);
    copy_file(&source, &ctx.out_dir().join(&output))
      .await
      .map_err(|e| AssetError::Copy {
        path: source.clone(),
        source: e,
      })?;
    debug!(asset = %logical, output = %output, "copied asset");
    copied.insert(logical.to_string(), output);
  }

  Ok(copied)
}
