use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative shutdown signal shared by the watcher loop, every event
/// stream and the HTTP listener.
#[derive(Debug, Clone)]
pub struct Shutdown {
  tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
  fn default() -> Self {
    Self::new()
  }
}

impl Shutdown {
  pub fn new() -> Self {
    let (tx, _) = watch::channel(false);
    Self { tx: Arc::new(tx) }
  }

  pub fn trigger(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_triggered(&self) -> bool {
    *self.tx.borrow()
  }

  pub fn listener(&self) -> ShutdownListener {
    ShutdownListener { rx: self.tx.subscribe() }
  }
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
  rx: watch::Receiver<bool>,
}

impl ShutdownListener {
  /// Resolves once shutdown is triggered, or once every [`Shutdown`] handle
  /// is gone.
  pub async fn cancelled(&mut self) {
    let _ = self.rx.wait_for(|triggered| *triggered).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn listeners_observe_trigger() {
    let shutdown = Shutdown::new();
    let mut first = shutdown.listener();
    let mut second = shutdown.listener();

    let waiter = tokio::spawn(async move { first.cancelled().await });
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    tokio::time::timeout(Duration::from_secs(1), second.cancelled()).await.unwrap();
    assert!(shutdown.is_triggered());
  }

  #[tokio::test]
  async fn late_listener_sees_earlier_trigger() {
    let shutdown = Shutdown::new();
    shutdown.trigger();

    let mut listener = shutdown.listener();
    tokio::time::timeout(Duration::from_secs(1), listener.cancelled()).await.unwrap();
  }
}
