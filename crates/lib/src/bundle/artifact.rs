use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::BundleError;
use crate::paths::{normalize, relative_to, to_slash};

/// What one entry point produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  /// Canonical source path.
  pub entry: PathBuf,
  /// Absolute output path.
  pub output: PathBuf,
  /// Absolute path of the stylesheet bundle, if the entry imported CSS.
  pub css_bundle: Option<PathBuf>,
  /// Absolute paths of every source file that went into the output.
  pub inputs: Vec<PathBuf>,
}

/// Output paths of an entry relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
  pub output: String,
  pub css_bundle: Option<String>,
}

/// Artifacts of one bundler invocation keyed by canonical entry path.
///
/// Canonical means absolute and lexically normalized, so `./src/a.ts` and
/// `src/a.ts` under the same root find the same artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactMap {
  artifacts: BTreeMap<PathBuf, Artifact>,
}

impl ArtifactMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, artifact: Artifact) {
    let key = normalize(&artifact.entry);
    self.artifacts.insert(key, artifact);
  }

  pub fn get(&self, entry: &Path) -> Option<&Artifact> {
    self.artifacts.get(&normalize(entry))
  }

  pub fn len(&self) -> usize {
    self.artifacts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.artifacts.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
    self.artifacts.values()
  }

  /// Every input file of every artifact, deduplicated.
  pub fn inputs(&self) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = self.iter().flat_map(|a| a.inputs.iter().cloned()).collect();
    inputs.sort();
    inputs.dedup();
    inputs
  }

  /// Merges another invocation's artifacts into this map.
  pub fn extend(&mut self, other: ArtifactMap) {
    self.artifacts.extend(other.artifacts);
  }

  /// Output of `entry` as a slash-separated path relative to `out_root`.
  pub fn resolve(&self, entry: &Path, out_root: &Path) -> Result<ResolvedArtifact, BundleError> {
    let no_output = || BundleError::NoOutput {
      entry: entry.to_path_buf(),
    };
    let artifact = self.get(entry).ok_or_else(no_output)?;
    let relative = |path: &Path| relative_to(out_root, path).map(|p| to_slash(&p));

    Ok(ResolvedArtifact {
      output: relative(artifact.output.as_path()).ok_or_else(no_output)?,
      css_bundle: artifact.css_bundle.as_deref().and_then(relative),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn map() -> ArtifactMap {
    let mut map = ArtifactMap::new();
    map.insert(Artifact {
      entry: PathBuf::from("/project/src/popup.tsx"),
      output: PathBuf::from("/project/dist/default_popup.js"),
      css_bundle: Some(PathBuf::from("/project/dist/default_popup.css")),
      inputs: vec![
        PathBuf::from("/project/src/popup.tsx"),
        PathBuf::from("/project/src/app.tsx"),
      ],
    });
    map.insert(Artifact {
      entry: PathBuf::from("/project/src/content-1.ts"),
      output: PathBuf::from("/project/dist/content-0/content-1.js"),
      css_bundle: None,
      inputs: vec![PathBuf::from("/project/src/content-1.ts"), PathBuf::from("/project/src/app.tsx")],
    });
    map
  }

  #[test]
  fn resolves_relative_to_the_output_root() {
    let resolved = map()
      .resolve(Path::new("/project/src/popup.tsx"), Path::new("/project/dist"))
      .unwrap();

    assert_eq!(resolved.output, "default_popup.js");
    assert_eq!(resolved.css_bundle.as_deref(), Some("default_popup.css"));
  }

  #[test]
  fn lookup_is_by_canonical_path() {
    let resolved = map()
      .resolve(Path::new("/project/src/./nested/../content-1.ts"), Path::new("/project/dist"))
      .unwrap();

    assert_eq!(resolved.output, "content-0/content-1.js");
    assert_eq!(resolved.css_bundle, None);
  }

  #[test]
  fn unknown_entry_is_an_error() {
    let err = map()
      .resolve(Path::new("/project/src/missing.ts"), Path::new("/project/dist"))
      .unwrap_err();

    assert!(matches!(err, BundleError::NoOutput { .. }));
  }

  #[test]
  fn inputs_are_deduplicated() {
    assert_eq!(map().inputs().len(), 3);
  }
}
