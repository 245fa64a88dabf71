//! Implementation of the `webext build` command.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use webext_lib::build::Pipeline;
use webext_lib::config::Config;
use webext_lib::manifest::Manifest;

use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_success};

/// Runs the production pipeline once and prints what was emitted.
pub fn cmd_build(config: &Config, output: OutputFormat) -> Result<()> {
  let start = Instant::now();

  let ctx = config.context().context("Failed to resolve project root")?;
  let manifest = Manifest::load(ctx.manifest_path()).context("Failed to load manifest")?;
  let bundler = config.bundler(&ctx);
  info!(root = ?ctx.root(), out_dir = ?ctx.out_dir(), "building");

  let rt = super::runtime()?;
  let summary = rt
    .block_on(Pipeline::new(&ctx, &bundler).run(manifest))
    .context("Build failed")?;

  if output.is_json() {
    print_json(&summary)?;
  } else {
    print_success("Build complete!");
    print_stat("Output", &summary.out_dir.display().to_string());
    print_stat("Entries", &summary.entries.to_string());
    print_stat("Content groups", &summary.content_groups.to_string());
    if let Some(popup) = &summary.popup {
      print_stat("Popup", &popup.display().to_string());
    }
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
