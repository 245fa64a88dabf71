use tracing::debug;

use super::types::{BuildPlan, ContentGroupPlan};
use crate::config::BuildContext;
use crate::consts::DEFAULT_POPUP_TITLE;
use crate::manifest::Manifest;
use crate::paths::group_base;
use crate::popup::{PopupError, PopupSource};

/// Derives the entries of a build from the author manifest.
///
/// Shared by the production pipeline and the dev session; loading the popup
/// document is the only file system access.
pub async fn plan(ctx: &BuildContext, manifest: Manifest) -> Result<BuildPlan, PopupError> {
  let background = manifest.service_worker().map(|sw| ctx.source(sw));

  let popup = match manifest.popup() {
    Some(logical) => Some(PopupSource::load(ctx, logical).await?),
    None => None,
  };

  let content_groups: Vec<ContentGroupPlan> = manifest
    .content_groups()
    .iter()
    .enumerate()
    .map(|(index, group)| {
      let scripts: Vec<_> = group.js.iter().map(|js| ctx.source(js)).collect();
      let base = group_base(&scripts);
      let base = if base.as_os_str().is_empty() {
        ctx.root().to_path_buf()
      } else {
        base
      };
      ContentGroupPlan {
        index,
        scripts,
        base,
      }
    })
    .collect();

  let title = manifest.name.clone().unwrap_or_else(|| DEFAULT_POPUP_TITLE.to_string());

  debug!(
    background = background.is_some(),
    popup = popup.is_some(),
    content_groups = content_groups.len(),
    "planned build"
  );

  Ok(BuildPlan {
    manifest,
    title,
    background,
    popup,
    content_groups,
  })
}
