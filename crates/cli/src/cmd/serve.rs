//! Implementation of the `webext serve` command.

use anyhow::{Context, Result};

use webext_lib::config::Config;
use webext_lib::dev::{DevConfig, DevSession, Shutdown};

use crate::ServeArgs;
use crate::output::{print_info, print_stat, print_success, print_warning};

/// Serves the project until Ctrl-C.
pub fn cmd_serve(config: &Config, args: &ServeArgs) -> Result<()> {
  let ctx = config.context().context("Failed to resolve project root")?;
  let bundler = config.bundler(&ctx);
  let dev = DevConfig {
    port: args.port.unwrap_or(config.port),
    debounce: args.debounce.into(),
  };

  let rt = super::runtime()?;
  rt.block_on(async move {
    let session = DevSession::new(ctx, dev)
      .bind()
      .await
      .context("Failed to start dev server")?;

    print_success(&format!("Dev server running at {}", session.origin()));
    print_stat("Output", &session.context().out_dir().display().to_string());
    print_info("Load the output directory as an unpacked extension. Press Ctrl-C to stop.");

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
      match tokio::signal::ctrl_c().await {
        Ok(()) => signal.trigger(),
        Err(e) => print_warning(&format!("Failed to listen for Ctrl-C: {}", e)),
      }
    });

    let closed = session.serve(bundler, shutdown).await.context("Dev session failed")?;

    println!();
    print_info(&format!("Dev server stopped after {} change cycle(s)", closed.cycles()));
    Ok(())
  })
}
