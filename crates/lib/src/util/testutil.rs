//! Test utilities for webext-lib.
//!
//! [`FakeBundler`] stands in for esbuild: it copies each entry to its output
//! path, records every request, and reports relative `import` statements as
//! inputs so watch-set behaviour can be exercised without a real bundler.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::bundle::{Artifact, ArtifactMap, BundleError, BundleRequest, Bundler, Format};
use crate::paths::{absolutize, relative_to};

#[derive(Debug, Default)]
pub struct FakeBundler {
  requests: Mutex<Vec<BundleRequest>>,
}

impl FakeBundler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every request seen so far, in order.
  pub fn requests(&self) -> Vec<BundleRequest> {
    self.requests.lock().unwrap().clone()
  }
}

/// Relative specifiers of `import ... from "./x"` and `import "./x"` lines.
fn relative_imports(source: &str) -> Vec<String> {
  source
    .lines()
    .filter(|line| line.trim_start().starts_with("import"))
    .filter_map(|line| {
      let quote = line.rfind(['"', '\''])?;
      let open = line[..quote].rfind(['"', '\''])?;
      let spec = &line[open + 1..quote];
      spec.starts_with('.').then(|| spec.to_string())
    })
    .collect()
}

fn output_stem(request: &BundleRequest, entry: &Path, name: Option<&str>) -> PathBuf {
  if let Some(name) = name {
    return PathBuf::from(name);
  }
  let mirrored = request
    .out_base
    .as_deref()
    .and_then(|base| relative_to(base, entry))
    .or_else(|| entry.file_name().map(PathBuf::from))
    .unwrap_or_default();
  mirrored.with_extension("")
}

impl Bundler for FakeBundler {
  async fn bundle(&self, request: &BundleRequest) -> Result<ArtifactMap, BundleError> {
    self.requests.lock().unwrap().push(request.clone());

    let mut map = ArtifactMap::new();
    for entry in &request.entries {
      let source = tokio::fs::read_to_string(&entry.path).await?;
      let stem = output_stem(request, &entry.path, entry.name.as_deref());
      let output = request.out_dir.join(&stem).with_extension("js");

      let header = match request.format {
        Format::Esm => "// esm",
        Format::Iife => "// iife",
      };
      crate::util::fs::write_file(&output, format!("{}\n{}", header, source)).await?;

      let css_bundle = if source.contains(".css") {
        let css = output.with_extension("css");
        crate::util::fs::write_file(&css, "body{}\n").await?;
        Some(css)
      } else {
        None
      };

      let dir = entry.path.parent().unwrap_or(Path::new(""));
      let mut inputs = vec![entry.path.clone()];
      inputs.extend(relative_imports(&source).iter().map(|s| absolutize(dir, Path::new(s))));

      map.insert(Artifact {
        entry: entry.path.clone(),
        output,
        css_bundle,
        inputs,
      });
    }

    Ok(map)
  }
}

/// Writes `files` (relative path, contents) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
  for (path, contents) in files {
    let path = root.join(path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
  }
}

/// A small extension project with every entry kind.
pub const EXAMPLE_MANIFEST: &str = r#"{
  "manifest_version": 3,
  "name": "Example",
  "version": "1.0.0",
  "action": { "default_popup": "src/popup.html" },
  "background": { "service_worker": "src/background.ts" },
  "content_scripts": [
    { "js": ["./src/content-1.ts", "./src/nested/content-2.ts"], "matches": ["<all_urls>"] },
    { "js": ["./src/content-3.ts"], "matches": ["<all_urls>"], "run_at": "document_end" },
    { "js": ["./src/content-4.ts"] }
  ],
  "icons": { "16": "./icons/16.png" }
}"#;

pub const EXAMPLE_POPUP: &str = r#"<!doctype html>
<html>
<head><title>Popup</title></head>
<body>
  <div id="root"></div>
  <script type="module" src="./popup.tsx"></script>
</body>
</html>
"#;

pub fn example_project(root: &Path) {
  write_tree(
    root,
    &[
      ("manifest.json", EXAMPLE_MANIFEST),
      ("src/popup.html", EXAMPLE_POPUP),
      ("src/popup.tsx", "import \"./popup.css\";\nimport { App } from \"./app.tsx\";\nApp();\n"),
      ("src/app.tsx", "export const App = () => {};\n"),
      ("src/popup.css", "body { margin: 0; }\n"),
      ("src/background.ts", "console.log(process.env.DEV_SERVER_URL);\n"),
      ("src/content-1.ts", "console.log(1);\n"),
      ("src/nested/content-2.ts", "console.log(2);\n"),
      ("src/content-3.ts", "console.log(3);\n"),
      ("src/content-4.ts", "console.log(4);\n"),
      ("icons/16.png", "png"),
    ],
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn finds_relative_imports() {
    let imports = relative_imports("import \"./a.css\";\nimport { b } from './b';\nimport x from \"react\";\nconst y = 1;\n");
    assert_eq!(imports, vec!["./a.css", "./b"]);
  }
}
