//! Process-wide online/offline signal.
//!
//! The platform side ([`ConnectivityPublisher`]) is the only writer. Any
//! number of consumers hold a [`ConnectivitySignal`] and read or watch it;
//! a watch is dropped to unsubscribe.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Platform connectivity transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
  Online,
  Offline,
}

/// Create a publisher/signal pair seeded with the platform's current state.
pub fn channel(initially_online: bool) -> (ConnectivityPublisher, ConnectivitySignal) {
  let (tx, rx) = watch::channel(initially_online);
  (ConnectivityPublisher { tx }, ConnectivitySignal { rx })
}

/// Write side of the signal, owned by whatever observes the platform.
#[derive(Debug)]
pub struct ConnectivityPublisher {
  tx: watch::Sender<bool>,
}

impl ConnectivityPublisher {
  /// Apply a transition. Returns `true` if the value changed.
  pub fn apply(&self, event: ConnectivityEvent) -> bool {
    let online = event == ConnectivityEvent::Online;
    let previous = self.tx.send_replace(online);
    previous != online
  }

  /// A new read handle onto the same value.
  pub fn signal(&self) -> ConnectivitySignal {
    ConnectivitySignal {
      rx: self.tx.subscribe(),
    }
  }
}

/// Read-only view of the online flag.
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
  rx: watch::Receiver<bool>,
}

impl ConnectivitySignal {
  /// Current value.
  pub fn is_online(&self) -> bool {
    *self.rx.borrow()
  }

  /// Whether state-mutating actions should be offered.
  pub fn actions_enabled(&self) -> bool {
    self.is_online()
  }

  /// Start watching for transitions. Drop the returned handle to stop.
  pub fn subscribe(&self) -> ConnectivityWatch {
    let mut rx = self.rx.clone();
    rx.mark_unchanged();
    ConnectivityWatch { rx }
  }
}

/// A live subscription to connectivity transitions.
#[derive(Debug)]
pub struct ConnectivityWatch {
  rx: watch::Receiver<bool>,
}

impl ConnectivityWatch {
  /// Value at the time of the call.
  pub fn current(&self) -> bool {
    *self.rx.borrow()
  }

  /// Wait for the next transition. Returns `None` once the publisher is gone.
  pub async fn changed(&mut self) -> Option<bool> {
    self.rx.changed().await.ok()?;
    Some(*self.rx.borrow_and_update())
  }
}

/// Something that can tell whether the backend is reachable right now.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync + 'static {
  async fn is_reachable(&self) -> bool;
}

/// Background monitor that turns periodic probes into transition events.
pub struct ConnectivityMonitor {
  signal: ConnectivitySignal,
  handle: JoinHandle<()>,
}

impl ConnectivityMonitor {
  /// Probe once to seed the signal, then keep probing every `interval`.
  pub async fn spawn<P: ReachabilityProbe>(probe: P, interval: Duration) -> Self {
    let initial = probe.is_reachable().await;
    let (publisher, signal) = channel(initial);
    info!(online = initial, "connectivity monitor started");

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      // The first tick completes immediately and the initial state is known
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let event = if probe.is_reachable().await {
          ConnectivityEvent::Online
        } else {
          ConnectivityEvent::Offline
        };
        if publisher.apply(event) {
          info!(?event, "connectivity changed");
        }
        if publisher.tx.is_closed() {
          break;
        }
      }
    });

    Self { signal, handle }
  }

  pub fn signal(&self) -> ConnectivitySignal {
    self.signal.clone()
  }
}

impl Drop for ConnectivityMonitor {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  #[test]
  fn test_initial_value() {
    let (_publisher, signal) = channel(false);
    assert!(!signal.is_online());
    assert!(!signal.actions_enabled());
  }

  #[test]
  fn test_apply_reports_changes_only() {
    let (publisher, signal) = channel(true);
    assert!(!publisher.apply(ConnectivityEvent::Online));
    assert!(publisher.apply(ConnectivityEvent::Offline));
    assert!(!signal.is_online());
  }

  #[tokio::test]
  async fn test_multiple_subscribers_see_transition() {
    let (publisher, signal) = channel(true);
    let mut first = signal.subscribe();
    let mut second = publisher.signal().subscribe();

    publisher.apply(ConnectivityEvent::Offline);

    assert_eq!(first.changed().await, Some(false));
    assert_eq!(second.changed().await, Some(false));
    assert!(!first.current());
  }

  #[tokio::test]
  async fn test_watch_ends_when_publisher_dropped() {
    let (publisher, signal) = channel(true);
    let mut watch = signal.subscribe();
    drop(publisher);
    assert_eq!(watch.changed().await, None);
  }

  struct ToggleProbe(Arc<AtomicBool>);

  #[async_trait]
  impl ReachabilityProbe for ToggleProbe {
    async fn is_reachable(&self) -> bool {
      self.0.load(Ordering::SeqCst)
    }
  }

  #[tokio::test]
  async fn test_monitor_publishes_probe_results() {
    let reachable = Arc::new(AtomicBool::new(true));
    let monitor =
      ConnectivityMonitor::spawn(ToggleProbe(reachable.clone()), Duration::from_millis(5)).await;
    let signal = monitor.signal();
    assert!(signal.is_online());

    let mut watch = signal.subscribe();
    reachable.store(false, Ordering::SeqCst);
    let next = tokio::time::timeout(Duration::from_secs(1), watch.changed())
      .await
      .unwrap();
    assert_eq!(next, Some(false));
  }
}
