//! The dev artifact set written to the output directory.
//!
//! None of these files contain bundled code. Each one bootstraps the real
//! modules from the dev server, so source edits only need a reload.

use std::path::Path;

use tracing::debug;

use super::DevError;
use crate::assets::copy_assets;
use crate::build::BuildPlan;
use crate::config::BuildContext;
use crate::consts::{DEV_BACKGROUND_SHIM, DEV_POPUP_SHIM, MANIFEST_FILE, POPUP_DOCUMENT};
use crate::manifest::{self, DevOrigin, OutputLayout, ResolvedManifest, Target};
use crate::paths::to_slash;
use crate::render::{render_dev_background, render_dev_content, render_dev_popup_script};
use crate::util::fs::{write_atomic, write_file};

fn served_path(ctx: &BuildContext, path: &Path) -> String {
  ctx.logical(path).unwrap_or_else(|| to_slash(path))
}

async fn write(path: &Path, contents: String) -> Result<(), DevError> {
  write_file(path, contents).await.map_err(|source| DevError::Write {
    path: path.to_path_buf(),
    source,
  })
}

/// Writes every dev artifact for `plan`, the resolved manifest last.
pub async fn write_dev_artifacts(
  ctx: &BuildContext,
  origin: &DevOrigin,
  plan: &BuildPlan,
) -> Result<ResolvedManifest, DevError> {
  let out_dir = ctx.out_dir();
  let mut layout = OutputLayout::default();

  if let Some(popup) = &plan.popup {
    write(&out_dir.join(DEV_POPUP_SHIM), render_dev_popup_script(origin)).await?;
    write(&out_dir.join(POPUP_DOCUMENT), popup.render_dev(ctx, origin, &plan.title)).await?;
    layout.popup = Some(POPUP_DOCUMENT.to_string());
  }

  if let Some(background) = &plan.background {
    let script = render_dev_background(origin, &served_path(ctx, background));
    write(&out_dir.join(DEV_BACKGROUND_SHIM), script).await?;
    layout.background = Some(DEV_BACKGROUND_SHIM.to_string());
  }

  for group in &plan.content_groups {
    let name = format!("{}.js", group.dir_name());
    let scripts: Vec<String> = group.scripts.iter().map(|s| served_path(ctx, s)).collect();
    write(&out_dir.join(&name), render_dev_content(origin, &scripts)).await?;
    layout.content_scripts.push(vec![name]);
  }

  layout.assets = copy_assets(ctx, &plan.manifest).await?;

  let resolved = manifest::resolve(&plan.manifest, &Target::Dev(origin.clone()), &layout)?;
  let manifest_path = out_dir.join(MANIFEST_FILE);
  write_atomic(&manifest_path, resolved.to_json()?)
    .await
    .map_err(|source| DevError::Write {
      path: manifest_path.clone(),
      source,
    })?;

  debug!(out_dir = ?out_dir, "wrote dev artifacts");
  Ok(resolved)
}
