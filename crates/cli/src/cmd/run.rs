use anyhow::Result;

use webext_lib::config::Config;
use webext_lib::manifest::Mode;

use crate::ServeArgs;
use crate::output::OutputFormat;

/// `NODE_ENV=development` serves, anything else builds.
pub fn cmd_run(config: &Config, args: &ServeArgs) -> Result<()> {
  match config.mode {
    Mode::Dev => super::cmd_serve(config, args),
    Mode::Build => super::cmd_build(config, OutputFormat::Text),
  }
}
