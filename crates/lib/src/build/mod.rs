//! Production builds.
//!
//! A build runs as an explicit pipeline over a [`BuildContext`]:
//!
//! - [`Pipeline::configure`]: derive the [`BuildPlan`] from the author manifest
//! - [`Pipeline::resolve`]: clear the output directory, bundle every entry,
//!   copy static assets, render the popup and resolve the manifest
//! - [`Pipeline::emit`]: write the popup document and `manifest.json`
//!
//! Manifest resolution always runs last, after every artifact of the build
//! exists.

mod plan;
mod types;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

pub use plan::plan;
pub use types::*;

use crate::assets::copy_assets;
use crate::bundle::{self, ArtifactMap, BundleRequest, Bundler, EntryPoint, Format, ResolvedArtifact};
use crate::config::BuildContext;
use crate::consts::{BACKGROUND_OUTPUT, MANIFEST_FILE, POPUP_DOCUMENT};
use crate::manifest::{self, Manifest, OutputLayout, Target};
use crate::util::fs::{clear_dir, write_atomic, write_file};

pub struct Pipeline<'a, B: Bundler> {
  ctx: &'a BuildContext,
  bundler: &'a B,
}

impl<'a, B: Bundler> Pipeline<'a, B> {
  pub fn new(ctx: &'a BuildContext, bundler: &'a B) -> Self {
    Self { ctx, bundler }
  }

  pub async fn configure(&self, manifest: Manifest) -> Result<BuildPlan, BuildError> {
    Ok(plan(self.ctx, manifest).await?)
  }

  fn request(&self, entries: Vec<EntryPoint>, out_dir: PathBuf, format: Format) -> BundleRequest {
    let mut request = BundleRequest::new(entries, out_dir, format);
    request.minify = true;
    request.defines = bundle::defines(&Target::Build);
    request
  }

  pub async fn resolve(&self, plan: &BuildPlan) -> Result<ResolvedBuild, BuildError> {
    check_out_dir(self.ctx)?;
    let out_dir = self.ctx.out_dir();
    clear_dir(out_dir).await.map_err(BuildError::write(out_dir))?;

    let mut artifacts = ArtifactMap::new();
    let mut layout = OutputLayout::default();

    if let Some(background) = &plan.background {
      let name = BACKGROUND_OUTPUT.trim_end_matches(".js");
      let request = self.request(
        vec![EntryPoint::named(name, background.clone())],
        out_dir.to_path_buf(),
        Format::Esm,
      );
      let produced = self.bundler.bundle(&request).await?;
      layout.background = Some(produced.resolve(background, out_dir)?.output);
      artifacts.extend(produced);
    }

    let mut popup_html = None;
    if let Some(popup) = &plan.popup {
      let entries = popup.entry_points();
      let mut outputs: BTreeMap<PathBuf, ResolvedArtifact> = BTreeMap::new();
      if !entries.is_empty() {
        let request = self.request(entries, out_dir.to_path_buf(), Format::Esm);
        let produced = self.bundler.bundle(&request).await?;
        for script in popup.scripts() {
          let resolved = produced.resolve(&script, out_dir)?;
          outputs.insert(script, resolved);
        }
        artifacts.extend(produced);
      }
      popup_html = Some(popup.render_build(self.ctx, &plan.title, &outputs));
      layout.popup = Some(POPUP_DOCUMENT.to_string());
    }

    for group in &plan.content_groups {
      if group.scripts.is_empty() {
        layout.content_scripts.push(Vec::new());
        continue;
      }
      let entries = group.scripts.iter().cloned().map(EntryPoint::mirrored).collect();
      let mut request = self.request(entries, out_dir.join(group.dir_name()), Format::Iife);
      request.out_base = Some(group.base.clone());

      let produced = self.bundler.bundle(&request).await?;
      let outputs = group
        .scripts
        .iter()
        .map(|script| produced.resolve(script, out_dir).map(|r| r.output))
        .collect::<Result<Vec<_>, _>>()?;
      layout.content_scripts.push(outputs);
      artifacts.extend(produced);
    }

    layout.assets = copy_assets(self.ctx, &plan.manifest).await?;

    let manifest = manifest::resolve(&plan.manifest, &Target::Build, &layout)?;

    Ok(ResolvedBuild {
      manifest,
      layout,
      popup_html,
      artifacts,
    })
  }

  pub async fn emit(&self, build: &ResolvedBuild) -> Result<EmitSummary, BuildError> {
    let out_dir = self.ctx.out_dir();

    let popup = match &build.popup_html {
      Some(html) => {
        let path = out_dir.join(POPUP_DOCUMENT);
        write_file(&path, html).await.map_err(BuildError::write(&path))?;
        Some(path)
      }
      None => None,
    };

    let manifest_path = out_dir.join(MANIFEST_FILE);
    let json = build.manifest.to_json()?;
    write_atomic(&manifest_path, json)
      .await
      .map_err(BuildError::write(&manifest_path))?;

    let summary = EmitSummary {
      out_dir: out_dir.to_path_buf(),
      manifest: manifest_path,
      popup,
      entries: build.artifacts.len(),
      content_groups: build.layout.content_scripts.len(),
    };
    info!(
      out_dir = ?summary.out_dir,
      entries = summary.entries,
      inputs = build.artifacts.inputs().len(),
      "build emitted"
    );
    Ok(summary)
  }

  pub async fn run(&self, manifest: Manifest) -> Result<EmitSummary, BuildError> {
    let plan = self.configure(manifest).await?;
    let build = self.resolve(&plan).await?;
    self.emit(&build).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{FakeBundler, example_project, write_tree};
  use std::path::Path;
  use tempfile::TempDir;

  fn setup() -> (TempDir, BuildContext) {
    let temp = TempDir::new().unwrap();
    example_project(temp.path());
    let ctx = BuildContext::new(temp.path(), Path::new("dist")).unwrap();
    (temp, ctx)
  }

  fn read_manifest(ctx: &BuildContext) -> serde_json::Value {
    let content = std::fs::read_to_string(ctx.out_dir().join("manifest.json")).unwrap();
    serde_json::from_str(&content).unwrap()
  }

  #[tokio::test]
  async fn builds_example_project() {
    let (_temp, ctx) = setup();
    let bundler = FakeBundler::new();
    let manifest = Manifest::load(ctx.manifest_path()).unwrap();

    let summary = Pipeline::new(&ctx, &bundler).run(manifest).await.unwrap();
    let out = ctx.out_dir();
    let json = read_manifest(&ctx);

    assert_eq!(summary.content_groups, 3);
    assert_eq!(json["manifest_version"], 3);
    assert_eq!(json["name"], "Example");
    assert_eq!(json["background"]["service_worker"], "background.js");
    assert_eq!(json["background"]["type"], "module");
    assert_eq!(json["action"]["default_popup"], "default_popup.html");
    assert_eq!(json["icons"]["16"], "icons/16.png");
    assert!(json.get("content_security_policy").is_none());

    let groups = json["content_scripts"].as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["js"], serde_json::json!(["content-0/content-1.js", "content-0/nested/content-2.js"]));
    assert_eq!(groups[1]["js"], serde_json::json!(["content-1/content-3.js"]));
    assert_eq!(groups[1]["run_at"], "document_end");

    assert!(out.join("background.js").is_file());
    assert!(out.join("default_popup.js").is_file());
    assert!(out.join("content-0/nested/content-2.js").is_file());
    assert!(out.join("content-2/content-4.js").is_file());
    assert!(out.join("icons/16.png").is_file());
  }

  #[tokio::test]
  async fn popup_document_links_bundled_outputs() {
    let (_temp, ctx) = setup();
    let bundler = FakeBundler::new();
    let manifest = Manifest::load(ctx.manifest_path()).unwrap();

    Pipeline::new(&ctx, &bundler).run(manifest).await.unwrap();
    let html = std::fs::read_to_string(ctx.out_dir().join("default_popup.html")).unwrap();

    assert!(html.contains(r#"<script type="module" src="./default_popup.js"></script>"#));
    assert!(html.contains(r#"<link rel="stylesheet" href="./default_popup.css">"#));
  }

  #[tokio::test]
  async fn bundles_with_production_options() {
    let (_temp, ctx) = setup();
    let bundler = FakeBundler::new();
    let manifest = Manifest::load(ctx.manifest_path()).unwrap();

    Pipeline::new(&ctx, &bundler).run(manifest).await.unwrap();
    let requests = bundler.requests();

    // background, popup, then one invocation per content group
    assert_eq!(requests.len(), 5);
    assert!(requests.iter().all(|r| r.minify && !r.sourcemap));
    assert_eq!(requests[0].format, Format::Esm);
    assert_eq!(requests[1].format, Format::Esm);
    assert!(requests[2..].iter().all(|r| r.format == Format::Iife));
    assert_eq!(requests[2].out_dir, ctx.out_dir().join("content-0"));
    assert_eq!(requests[2].out_base.as_deref(), Some(ctx.root().join("src").as_path()));
    assert_eq!(requests[0].defines["process.env.NODE_ENV"], "\"production\"");
  }

  #[tokio::test]
  async fn stale_outputs_are_removed() {
    let (_temp, ctx) = setup();
    write_tree(ctx.out_dir(), &[("stale.js", "old")]);
    let bundler = FakeBundler::new();
    let manifest = Manifest::load(ctx.manifest_path()).unwrap();

    Pipeline::new(&ctx, &bundler).run(manifest).await.unwrap();

    assert!(!ctx.out_dir().join("stale.js").exists());
  }

  #[tokio::test]
  async fn refuses_to_clear_the_project_root() {
    let (temp, _) = setup();
    let ctx = BuildContext::new(temp.path(), Path::new(".")).unwrap();
    let bundler = FakeBundler::new();
    let manifest = Manifest::load(ctx.manifest_path()).unwrap();

    let err = Pipeline::new(&ctx, &bundler).run(manifest).await.unwrap_err();

    assert!(matches!(err, BuildError::UnsafeOutDir { .. }));
    assert!(ctx.manifest_path().exists());
  }

  #[tokio::test]
  async fn missing_entry_source_fails_the_build() {
    let (_temp, ctx) = setup();
    std::fs::remove_file(ctx.root().join("src/background.ts")).unwrap();
    let bundler = FakeBundler::new();
    let manifest = Manifest::load(ctx.manifest_path()).unwrap();

    let err = Pipeline::new(&ctx, &bundler).run(manifest).await.unwrap_err();

    assert!(matches!(err, BuildError::Bundle(_)));
    assert!(!ctx.out_dir().join("manifest.json").exists());
  }

  #[tokio::test]
  async fn script_popup_gets_generated_document() {
    let (_temp, ctx) = setup();
    let mut manifest = Manifest::load(ctx.manifest_path()).unwrap();
    manifest.action.as_mut().unwrap().default_popup = Some("src/popup.tsx".to_string());
    let bundler = FakeBundler::new();

    Pipeline::new(&ctx, &bundler).run(manifest).await.unwrap();
    let html = std::fs::read_to_string(ctx.out_dir().join("default_popup.html")).unwrap();

    assert!(html.contains("<title>Example</title>"));
    assert!(html.contains(r#"src="./default_popup.js""#));
  }

  #[tokio::test]
  async fn stages_can_be_run_separately() {
    let (_temp, ctx) = setup();
    let bundler = FakeBundler::new();
    let pipeline = Pipeline::new(&ctx, &bundler);
    let manifest = Manifest::load(ctx.manifest_path()).unwrap();

    let plan = pipeline.configure(manifest).await.unwrap();
    let build = pipeline.resolve(&plan).await.unwrap();
    assert!(!ctx.out_dir().join("manifest.json").exists());

    let summary = pipeline.emit(&build).await.unwrap();
    assert_eq!(summary.manifest, ctx.out_dir().join("manifest.json"));
    assert_eq!(read_manifest(&ctx)["background"]["service_worker"], "background.js");
  }
}
