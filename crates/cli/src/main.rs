mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// webext - build and serve browser extensions
#[derive(Parser)]
#[command(name = "webext")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Project root containing manifest.json
  #[arg(long, global = true, default_value = ".")]
  root: PathBuf,

  /// Output directory, relative to the root unless absolute
  #[arg(long, global = true)]
  out_dir: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
  /// Dev server port (0 picks a free port)
  #[arg(short, long)]
  port: Option<u16>,

  /// Quiet period before a batch of file changes is handled
  #[arg(long, default_value = "200ms")]
  debounce: humantime::Duration,
}

#[derive(Subcommand)]
enum Commands {
  /// Produce a production bundle
  Build {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Start the dev server with live reload
  Serve(ServeArgs),

  /// Build or serve depending on NODE_ENV
  Run(ServeArgs),
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .without_time()
    .init();

  let config = cmd::load_config(&cli.root, cli.out_dir.as_deref())?;

  match cli.command {
    Commands::Build { output } => cmd::cmd_build(&config, output),
    Commands::Serve(args) => cmd::cmd_serve(&config, &args),
    Commands::Run(args) => cmd::cmd_run(&config, &args),
  }
}
