mod build;
mod run;
mod serve;

use std::path::Path;

use anyhow::{Context, Result};

use webext_lib::config::Config;

pub use build::cmd_build;
pub use run::cmd_run;
pub use serve::cmd_serve;

/// Reads the environment configuration for `root`; flags take precedence.
pub fn load_config(root: &Path, out_dir: Option<&Path>) -> Result<Config> {
  let mut config = Config::from_env(root).context("Invalid configuration")?;
  if let Some(out_dir) = out_dir {
    config.out_dir = out_dir.to_path_buf();
  }
  Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
