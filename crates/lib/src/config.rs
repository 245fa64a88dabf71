//! Environment-driven configuration and the per-invocation build context.

use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bundle::EsbuildBundler;
use crate::consts::{
  DEFAULT_ESBUILD, DEFAULT_OUT_DIR, DEFAULT_PORT, DEFAULT_TARGET, ENV_ESBUILD, ENV_MODE, ENV_OUT_DIR, ENV_PORT,
  ENV_TARGET, MANIFEST_FILE,
};
use crate::manifest::Mode;
use crate::paths::{absolutize, normalize, relative_to, to_slash};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid PORT value '{value}': {source}")]
  InvalidPort { value: String, source: ParseIntError },

  #[error("project root {} is not accessible: {source}", path.display())]
  Root { path: PathBuf, source: std::io::Error },
}

fn var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub root: PathBuf,
  /// Dev server port; `0` binds an ephemeral port.
  pub port: u16,
  pub mode: Mode,
  /// Output directory, relative to the root unless absolute.
  pub out_dir: PathBuf,
  /// esbuild binary name or path.
  pub esbuild: String,
  /// esbuild `--target` value.
  pub target: String,
}

impl Config {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      port: DEFAULT_PORT,
      mode: Mode::Build,
      out_dir: PathBuf::from(DEFAULT_OUT_DIR),
      esbuild: DEFAULT_ESBUILD.to_string(),
      target: DEFAULT_TARGET.to_string(),
    }
  }

  /// Reads `PORT`, `NODE_ENV`, `WEBEXT_OUT_DIR`, `WEBEXT_ESBUILD` and
  /// `WEBEXT_TARGET`, falling back to defaults for unset or empty values.
  pub fn from_env(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
    let mut config = Self::new(root);

    if let Some(value) = var(ENV_PORT) {
      config.port = value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidPort { value, source })?;
    }
    config.mode = Mode::from_node_env(var(ENV_MODE).as_deref());
    if let Some(out_dir) = var(ENV_OUT_DIR) {
      config.out_dir = PathBuf::from(out_dir);
    }
    if let Some(esbuild) = var(ENV_ESBUILD) {
      config.esbuild = esbuild;
    }
    if let Some(target) = var(ENV_TARGET) {
      config.target = target;
    }

    Ok(config)
  }

  pub fn context(&self) -> Result<BuildContext, ConfigError> {
    BuildContext::new(&self.root, &self.out_dir)
  }

  pub fn bundler(&self, ctx: &BuildContext) -> EsbuildBundler {
    EsbuildBundler::new(&self.esbuild, ctx.root(), &self.target)
  }
}

/// Paths shared by every stage of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
  root: PathBuf,
  out_dir: PathBuf,
  manifest_path: PathBuf,
}

impl BuildContext {
  /// Canonicalizes `root`; `out_dir` is resolved against it.
  pub fn new(root: &Path, out_dir: &Path) -> Result<Self, ConfigError> {
    let root = dunce::canonicalize(root).map_err(|source| ConfigError::Root {
      path: root.to_path_buf(),
      source,
    })?;
    let out_dir = absolutize(&root, out_dir);
    let manifest_path = root.join(MANIFEST_FILE);

    Ok(Self {
      root,
      out_dir,
      manifest_path,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn out_dir(&self) -> &Path {
    &self.out_dir
  }

  pub fn manifest_path(&self) -> &Path {
    &self.manifest_path
  }

  /// Absolute source path of a manifest-relative logical path.
  ///
  /// An absolute path that already lies under the root is taken as is. Any
  /// other leading `/` means the project root.
  pub fn source(&self, logical: &str) -> PathBuf {
    let path = Path::new(logical);
    if path.is_absolute() {
      let absolute = normalize(path);
      if absolute.starts_with(&self.root) {
        return absolute;
      }
    }
    absolutize(&self.root, Path::new(logical.trim_start_matches('/')))
  }

  /// Slash-separated path of `path` relative to the root.
  pub fn logical(&self, path: &Path) -> Option<String> {
    relative_to(&self.root, path).map(|p| to_slash(&p))
  }

  /// Whether `path` lies in the output directory.
  pub fn is_output(&self, path: &Path) -> bool {
    relative_to(&self.out_dir, path).is_some()
  }
}
